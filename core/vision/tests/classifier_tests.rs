// Checkpoint loading and end-to-end classification with a small random model

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use dermasense_vision::{
    DevicePreference, ImageClassifier, Labels, ModelSettings, SkinClassifier, SwinConfig,
    VisionError, CLASS_NAMES,
};
use image::{Rgb, RgbImage};
use std::path::PathBuf;

fn small_config() -> SwinConfig {
    SwinConfig {
        image_size: 56,
        patch_size: 4,
        in_channels: 3,
        embed_dim: 8,
        depths: vec![2, 2],
        num_heads: vec![1, 2],
        window_size: 7,
        mlp_ratio: 2,
        layer_norm_eps: 1e-5,
        num_classes: CLASS_NAMES.len(),
    }
}

/// Write randomly initialised weights for `small_config` and return the path.
fn write_random_checkpoint(dir: &tempfile::TempDir) -> PathBuf {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    dermasense_vision::SwinTransformer::new(&small_config(), vb).unwrap();

    let path = dir.path().join("swin-small-test.safetensors");
    varmap.save(&path).unwrap();
    path
}

fn sample_image() -> RgbImage {
    RgbImage::from_fn(80, 64, |x, y| Rgb([(x * 3) as u8, (y * 4) as u8, 128]))
}

#[test]
fn test_classify_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_random_checkpoint(&dir);

    let classifier = SkinClassifier::from_checkpoint(
        &path,
        None,
        small_config(),
        Labels::default(),
        Device::Cpu,
    )
    .unwrap();
    assert_eq!(classifier.device_name(), "cpu");

    let prediction = classifier.classify(&sample_image()).unwrap();
    assert!(prediction.index < CLASS_NAMES.len());
    assert_eq!(prediction.label, CLASS_NAMES[prediction.index]);
    assert!((0.0..=1.0).contains(&prediction.probability));
    assert!((0.5..=1.0).contains(&prediction.confidence));
    assert!((prediction.confidence - (0.5 + prediction.probability * 0.5)).abs() < 1e-6);
}

#[test]
fn test_probabilities_sum_to_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_random_checkpoint(&dir);
    let classifier = SkinClassifier::from_checkpoint(
        &path,
        None,
        small_config(),
        Labels::default(),
        Device::Cpu,
    )
    .unwrap();

    let probs = classifier.probabilities(&sample_image()).unwrap();
    assert_eq!(probs.len(), 23);
    let total: f32 = probs.iter().sum();
    assert!((total - 1.0).abs() < 1e-4);

    // top prediction is the arg-max of the distribution
    let prediction = classifier.classify(&sample_image()).unwrap();
    let best = probs.iter().cloned().fold(f32::MIN, f32::max);
    assert!((prediction.probability - best).abs() < 1e-6);
}

#[test]
fn test_classification_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_random_checkpoint(&dir);
    let classifier = SkinClassifier::from_checkpoint(
        &path,
        None,
        small_config(),
        Labels::default(),
        Device::Cpu,
    )
    .unwrap();

    let a = classifier.classify(&sample_image()).unwrap();
    let b = classifier.classify(&sample_image()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_head_width_must_match_labels() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config();
    config.num_classes = 5;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    dermasense_vision::SwinTransformer::new(&config, vb).unwrap();
    let path = dir.path().join("five-classes.safetensors");
    varmap.save(&path).unwrap();

    let result = SkinClassifier::from_checkpoint(
        &path,
        None,
        small_config(),
        Labels::default(),
        Device::Cpu,
    );
    assert!(matches!(
        result,
        Err(VisionError::LabelMismatch {
            labels: 23,
            classes: 5
        })
    ));
}

#[test]
fn test_missing_weights_is_fatal() {
    let settings = ModelSettings {
        weights_path: PathBuf::from("/definitely/not/here.pth"),
        device: DevicePreference::Cpu,
        ..Default::default()
    };
    match SkinClassifier::load(&settings) {
        Err(VisionError::WeightsNotFound(path)) => {
            assert_eq!(path, PathBuf::from("/definitely/not/here.pth"))
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("load should fail without weights"),
    }
}
