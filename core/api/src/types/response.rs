// dermasense/core/api/src/types/response.rs

use serde::{Deserialize, Serialize};

/// Body of `POST /analyze-image`.
///
/// The frontend deserialises this shape directly; field names and types must
/// not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: String,
    pub confidence: f32,
    pub recommendations: Vec<String>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub device: String,
}

impl HealthResponse {
    pub fn ok(device: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            device: device.into(),
        }
    }
}

/// Error body, `{"detail": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_response_field_names() {
        let response = AnalysisResponse {
            analysis: "text".to_string(),
            confidence: 0.75,
            recommendations: vec!["a".to_string()],
        };
        let json = serde_json::to_value(&response).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["analysis"], "text");
        assert_eq!(obj["confidence"], 0.75);
        assert_eq!(obj["recommendations"][0], "a");
    }

    #[test]
    fn test_health_ok() {
        let json = serde_json::to_string(&HealthResponse::ok("cpu")).unwrap();
        assert_eq!(json, r#"{"status":"ok","device":"cpu"}"#);
    }

    #[test]
    fn test_error_body_format() {
        let body = ErrorBody {
            detail: "File must be an image".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"detail":"File must be an image"}"#);
    }
}
