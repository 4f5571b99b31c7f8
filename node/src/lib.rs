//! DermaSense service: configuration and logging shared by the binary.

pub mod config;
pub mod logging;

pub use config::{MetricsConfig, ServerConfig, ServiceConfig};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
