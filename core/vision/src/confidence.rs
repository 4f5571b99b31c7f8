// dermasense/core/vision/src/confidence.rs

/// Maps a softmax probability onto the display range [0.5, 1.0].
///
/// This is a fixed affine transform for presentation. It is not a calibrated
/// probability and overstates the model's certainty for weak predictions.
pub fn rescale_confidence(probability: f32) -> f32 {
    0.5 + probability.clamp(0.0, 1.0) * 0.5
}
