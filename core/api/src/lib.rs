// dermasense/core/api/src/lib.rs

pub mod analysis;
pub mod error;
pub mod metrics_server;
pub mod routes;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use metrics_server::MetricsServer;
pub use server::{AnalysisServer, ApiConfig, AppState};
pub use types::response::{AnalysisResponse, ErrorBody, HealthResponse};
