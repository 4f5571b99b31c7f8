// dermasense/core/vision/src/types.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::device::DevicePreference;

/// Default checkpoint location, relative to the working directory.
pub const DEFAULT_WEIGHTS_PATH: &str = "best_swin_dermnet_finetuned_v2.pth";

/// Default timm model name the checkpoint was trained from.
pub const DEFAULT_VARIANT: &str = "swin_tiny_patch4_window7_224";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Checkpoint '{0}' not found")]
    WeightsNotFound(PathBuf),

    #[error("Unable to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Unknown model variant: {0}")]
    UnknownVariant(String),

    #[error("Label table has {labels} entries but the classifier head has {classes} outputs")]
    LabelMismatch { labels: usize, classes: usize },

    #[error("Checkpoint is missing tensor {0}")]
    MissingTensor(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Model produced no class scores")]
    EmptyOutput,

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Arg-max output index
    pub index: usize,
    /// Label at `index`
    pub label: String,
    /// Raw softmax probability of the top class
    pub probability: f32,
    /// Display confidence, always in [0.5, 1.0]
    pub confidence: f32,
}

/// Model loading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Checkpoint file (.pth, .pt, .bin or .safetensors)
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,

    /// timm model name, e.g. swin_tiny_patch4_window7_224
    #[serde(default = "default_variant")]
    pub variant: String,

    /// Compute device
    #[serde(default)]
    pub device: DevicePreference,

    /// Entry holding the state dict inside a pickled checkpoint.
    /// Probed automatically when unset.
    #[serde(default)]
    pub checkpoint_key: Option<String>,
}

fn default_weights_path() -> PathBuf {
    PathBuf::from(DEFAULT_WEIGHTS_PATH)
}

fn default_variant() -> String {
    DEFAULT_VARIANT.to_string()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            weights_path: default_weights_path(),
            variant: default_variant(),
            device: DevicePreference::default(),
            checkpoint_key: None,
        }
    }
}
