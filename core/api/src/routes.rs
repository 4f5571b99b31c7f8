// dermasense/core/api/src/routes.rs

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::Json,
};
use dermasense_vision::decode_image;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::error::ApiError;
use crate::metrics_server::{record_inference, record_request};
use crate::server::AppState;
use crate::types::response::{AnalysisResponse, HealthResponse};

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// GET /health - Health check
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    record_request("/health", StatusCode::OK);
    Json(HealthResponse::ok(state.classifier.device_name()))
}

/// POST /analyze-image - Classify an uploaded dermatology image
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let result = match multipart {
        Ok(multipart) => run_analysis(&state, multipart).await,
        Err(rejection) => Err(ApiError::Multipart(rejection.body_text())),
    };

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    };
    record_request("/analyze-image", status);

    result.map(Json)
}

async fn run_analysis(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<AnalysisResponse, ApiError> {
    let upload = read_upload(&mut multipart).await?;
    let upload_bytes = upload.len();
    let classifier = state.classifier.clone();
    let start = Instant::now();

    // Decoding and the forward pass are CPU-bound
    let prediction = tokio::task::spawn_blocking(move || {
        let image = decode_image(&upload).map_err(|e| {
            debug!("Rejecting undecodable upload: {}", e);
            ApiError::UndecodableImage
        })?;
        classifier.classify(&image).map_err(|e| {
            error!("Classification failed: {}", e);
            ApiError::Inference(e.to_string())
        })
    })
    .await
    .map_err(|e| ApiError::Inference(format!("Task join error: {}", e)))??;

    let elapsed = start.elapsed();
    record_inference(&prediction.label, elapsed.as_secs_f64());
    info!(
        label = %prediction.label,
        probability = prediction.probability,
        confidence = prediction.confidence,
        upload_bytes,
        latency_ms = elapsed.as_millis() as u64,
        "Image analysed"
    );

    Ok(AnalysisResponse::from(&prediction))
}

/// Pull the image part out of the form, checking its declared type.
async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            debug!("Rejecting upload with content type {:?}", field.content_type());
            return Err(ApiError::NotAnImage);
        }

        return Ok(field.bytes().await?);
    }

    Err(ApiError::MissingField(UPLOAD_FIELD))
}
