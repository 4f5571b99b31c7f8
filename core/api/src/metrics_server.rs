// dermasense/core/api/src/metrics_server.rs

use axum::{body::Body, http::StatusCode, response::Response, routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, Encoder, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

// Request Metrics
pub static REQUEST_COUNT: Lazy<prometheus::CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dermasense_requests_total",
        "Total number of HTTP requests",
        &["endpoint", "status"]
    )
    .expect("Failed to register request count metric")
});

// Inference Metrics
pub static INFERENCE_DURATION: Lazy<prometheus::Histogram> = Lazy::new(|| {
    register_histogram!(
        "dermasense_inference_duration_seconds",
        "Decode, preprocess and forward pass duration in seconds",
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register inference duration metric")
});

pub static PREDICTION_COUNT: Lazy<prometheus::CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dermasense_predictions_total",
        "Predictions by top label",
        &["label"]
    )
    .expect("Failed to register prediction count metric")
});

/// Metrics server configuration
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn router() -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
    }

    /// Start the metrics server
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting metrics server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, Self::router()).await?;

        Ok(())
    }
}

/// Handler for /metrics endpoint
async fn metrics_handler() -> Response<Body> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    let (status, content_type, body) = match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (StatusCode::OK, encoder.format_type().to_string(), Body::from(buffer)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain".to_string(),
            Body::from(format!("Error encoding metrics: {}", e)),
        ),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response
            .headers_mut()
            .insert(axum::http::header::CONTENT_TYPE, value);
    }
    response
}

/// Handler for /health endpoint
async fn health_handler() -> Response<Body> {
    Response::new(Body::from("{\"status\":\"ok\"}"))
}

/// Record a finished request
pub fn record_request(endpoint: &str, status: StatusCode) {
    REQUEST_COUNT
        .with_label_values(&[endpoint, status.as_str()])
        .inc();
}

/// Record inference time and the predicted label
pub fn record_inference(label: &str, duration: f64) {
    INFERENCE_DURATION.observe(duration);
    PREDICTION_COUNT.with_label_values(&[label]).inc();
}
