// dermasense/core/api/src/analysis.rs

use dermasense_vision::Prediction;

use crate::types::response::AnalysisResponse;

/// Display confidence below which the hedged template is used.
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.30;

/// Returned with every analysis, independent of the prediction.
pub const RECOMMENDATIONS: [&str; 3] = [
    "Monitor the area for changes in size, color, or shape.",
    "Avoid scratching or irritating the lesion.",
    "Consider consulting a dermatologist for a professional, in-person evaluation.",
];

pub fn recommendations() -> Vec<String> {
    RECOMMENDATIONS.iter().map(|s| s.to_string()).collect()
}

/// Render the explanation text for a label and display confidence.
pub fn explain(label: &str, confidence: f32) -> String {
    let lines = if confidence < LOW_CONFIDENCE_THRESHOLD {
        vec![
            "The model is **not very confident** about any specific diagnosis for this image."
                .to_string(),
            format!(
                "The closest pattern it sees is **{}**, but with low confidence ({:.2}).",
                label, confidence
            ),
        ]
    } else {
        vec![
            format!("The model's top prediction is **{}**.", label),
            format!("Estimated confidence: {:.2}.", confidence),
            "\nThis prediction is generated by a Swin Transformer model fine-tuned on dermatology images."
                .to_string(),
        ]
    };
    lines.join("\n")
}

impl From<&Prediction> for AnalysisResponse {
    fn from(prediction: &Prediction) -> Self {
        Self {
            analysis: explain(&prediction.label, prediction.confidence),
            confidence: prediction.confidence,
            recommendations: recommendations(),
        }
    }
}
