// dermasense/core/api/src/server.rs

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use dermasense_vision::ImageClassifier;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::routes::{analyze_image, health_check};

/// HTTP layer settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Browser origins allowed to call the API with credentials
    pub cors_origins: Vec<String>,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Server state for Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn ImageClassifier>,
}

/// Image analysis REST server
pub struct AnalysisServer {
    classifier: Arc<dyn ImageClassifier>,
    config: ApiConfig,
}

impl AnalysisServer {
    pub fn new(classifier: Arc<dyn ImageClassifier>, config: ApiConfig) -> Self {
        Self { classifier, config }
    }

    /// Create the Axum router with all API endpoints
    pub fn router(&self) -> Router {
        let state = AppState {
            classifier: self.classifier.clone(),
        };

        Router::new()
            .route("/health", get(health_check))
            .route("/analyze-image", post(analyze_image))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer(&self.config.cors_origins))
                    .layer(DefaultBodyLimit::max(self.config.max_upload_bytes)),
            )
            .with_state(state)
    }

    /// Start the REST API server
    pub async fn start(&self, addr: std::net::SocketAddr) -> anyhow::Result<()> {
        let app = self.router();

        info!(
            "Starting image analysis server on {} (device: {})",
            addr,
            self.classifier.device_name()
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Credentialed CORS for the configured origins.
///
/// Methods and headers are mirrored from the preflight request because
/// wildcards are not allowed together with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| {
            if origin.as_str() == "*" {
                warn!("Wildcard CORS origin cannot be combined with credentials, ignoring");
                return false;
            }
            true
        })
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
