// dermasense/core/vision/src/lib.rs

//! Skin-condition image classification.
//!
//! Everything needed to turn uploaded image bytes into a labelled prediction:
//! decoding and normalisation, a Swin Transformer forward pass on candle,
//! checkpoint loading, and the display-confidence rescale.

pub mod checkpoint;
pub mod classifier;
pub mod confidence;
pub mod device;
pub mod labels;
pub mod preprocess;
pub mod swin;
pub mod types;

pub use classifier::{ImageClassifier, SkinClassifier};
pub use confidence::rescale_confidence;
pub use device::{device_name, select_device, DevicePreference};
pub use labels::{Labels, CLASS_NAMES};
pub use preprocess::{decode_image, Preprocessor};
pub use swin::{SwinConfig, SwinTransformer};
pub use types::{ModelSettings, Prediction, VisionError};

pub type Result<T> = std::result::Result<T, VisionError>;
