// dermasense/core/vision/src/classifier.rs

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use image::RgbImage;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::checkpoint::load_state_dict;
use crate::confidence::rescale_confidence;
use crate::device::{device_name, select_device};
use crate::labels::Labels;
use crate::preprocess::Preprocessor;
use crate::swin::{SwinConfig, SwinTransformer};
use crate::types::{ModelSettings, Prediction, VisionError};

/// Anything that can label a decoded image.
///
/// Implementations are loaded once and shared read-only across requests.
pub trait ImageClassifier: Send + Sync {
    /// Compute device name, e.g. "cpu" or "cuda"
    fn device_name(&self) -> &str;

    /// Classify one RGB image
    fn classify(&self, image: &RgbImage) -> Result<Prediction, VisionError>;
}

/// Swin Transformer skin-condition classifier.
pub struct SkinClassifier {
    model: SwinTransformer,
    labels: Labels,
    preprocessor: Preprocessor,
    device: Device,
}

impl SkinClassifier {
    /// Load the configured checkpoint onto the selected device.
    ///
    /// Every failure here is meant to abort startup: a missing weight file,
    /// an unavailable device, an unknown variant, or a head whose width does
    /// not match the label table.
    pub fn load(settings: &ModelSettings) -> Result<Self, VisionError> {
        let labels = Labels::default();
        let config = SwinConfig::from_model_name(&settings.variant, labels.len())
            .ok_or_else(|| VisionError::UnknownVariant(settings.variant.clone()))?;
        let device = select_device(settings.device)?;

        info!(
            "Loading {} from {} on {}",
            settings.variant,
            settings.weights_path.display(),
            device_name(&device)
        );
        Self::from_checkpoint(
            &settings.weights_path,
            settings.checkpoint_key.as_deref(),
            config,
            labels,
            device,
        )
    }

    /// Load an explicit architecture from a checkpoint file.
    pub fn from_checkpoint(
        path: &Path,
        key: Option<&str>,
        config: SwinConfig,
        labels: Labels,
        device: Device,
    ) -> Result<Self, VisionError> {
        let start = Instant::now();
        let state_dict = load_state_dict(path, key)?;
        check_head(&state_dict, &labels)?;

        let vb = VarBuilder::from_tensors(state_dict, DType::F32, &device);
        let classifier = Self::from_var_builder(config, labels, vb, device)?;
        info!("Model ready in {:?}", start.elapsed());
        Ok(classifier)
    }

    /// Build from an already populated var builder.
    pub fn from_var_builder(
        config: SwinConfig,
        labels: Labels,
        vb: VarBuilder,
        device: Device,
    ) -> Result<Self, VisionError> {
        if config.num_classes != labels.len() {
            return Err(VisionError::LabelMismatch {
                labels: labels.len(),
                classes: config.num_classes,
            });
        }

        let preprocessor = Preprocessor::new(config.image_size);
        let model = SwinTransformer::new(&config, vb)?;
        Ok(Self {
            model,
            labels,
            preprocessor,
            device,
        })
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn config(&self) -> &SwinConfig {
        self.model.config()
    }

    /// Class probabilities for one image, in label order.
    pub fn probabilities(&self, image: &RgbImage) -> Result<Vec<f32>, VisionError> {
        let input = self.preprocessor.to_tensor(image, &self.device)?;
        let logits = self.model.forward(&input)?;
        let probs = candle_nn::ops::softmax_last_dim(&logits)?;
        let probs: Tensor = probs.squeeze(0)?.to_dtype(DType::F32)?;
        Ok(probs.to_vec1::<f32>()?)
    }
}

impl ImageClassifier for SkinClassifier {
    fn device_name(&self) -> &str {
        device_name(&self.device)
    }

    fn classify(&self, image: &RgbImage) -> Result<Prediction, VisionError> {
        let start = Instant::now();
        let probs = self.probabilities(image)?;
        let (index, probability) = arg_max(&probs).ok_or(VisionError::EmptyOutput)?;
        let label = self
            .labels
            .get(index)
            .ok_or(VisionError::LabelMismatch {
                labels: self.labels.len(),
                classes: probs.len(),
            })?
            .to_string();

        debug!(
            label = %label,
            probability,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Forward pass complete"
        );

        Ok(Prediction {
            index,
            label,
            probability,
            confidence: rescale_confidence(probability),
        })
    }
}

/// First index of the largest value. NaN scores never win.
pub fn arg_max(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

fn check_head(state_dict: &HashMap<String, Tensor>, labels: &Labels) -> Result<(), VisionError> {
    let head = state_dict
        .get("head.fc.weight")
        .ok_or_else(|| VisionError::MissingTensor("head.fc.weight".to_string()))?;
    let classes = head.dim(0)?;
    if classes != labels.len() {
        return Err(VisionError::LabelMismatch {
            labels: labels.len(),
            classes,
        });
    }
    Ok(())
}
