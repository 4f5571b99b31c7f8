//! Structured Logging Module
//!
//! Configures `tracing-subscriber` for the service binary: human-readable
//! output during development and JSON lines for log aggregation in
//! production.
//!
//! # Usage
//! ```no_run
//! use dermasense_node::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env();
//! init_logging(&config).unwrap();
//! tracing::info!("Service starting");
//! ```

use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format for log aggregation
    Json,
    /// Compact single-line format
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: LogLevel,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Enable ANSI colors (for terminal output)
    pub ansi_colors: bool,
    /// Enable span events (enter/exit)
    pub span_events: bool,
    /// Module-specific log levels
    pub module_levels: Vec<(String, LogLevel)>,
    /// Include target in logs
    pub include_target: bool,
    /// Include file location in logs
    pub include_location: bool,
    /// Include thread ID in logs
    pub include_thread_id: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            ansi_colors: true,
            span_events: false,
            module_levels: vec![("tower_http".to_string(), LogLevel::Info)],
            include_target: true,
            include_location: false,
            include_thread_id: false,
        }
    }
}

impl LogConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - RUST_LOG: Log level filter (e.g., "info,dermasense_api=debug")
    /// - LOG_FORMAT: Output format (json, pretty, compact)
    /// - LOG_ANSI: Enable ANSI colors (true/false)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            let level_str = rust_log.split(',').next().unwrap_or("info");
            config.level = LogLevel::parse(level_str);
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }

        if let Ok(ansi) = std::env::var("LOG_ANSI") {
            config.ansi_colors = ansi.to_lowercase() == "true";
        }

        config
    }

    /// JSON logging for production
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            ansi_colors: false,
            span_events: false,
            module_levels: vec![
                ("dermasense_api".to_string(), LogLevel::Info),
                ("dermasense_vision".to_string(), LogLevel::Info),
                ("tower_http".to_string(), LogLevel::Warn),
                ("hyper".to_string(), LogLevel::Warn),
            ],
            include_target: true,
            include_location: true,
            include_thread_id: true,
        }
    }

    /// Verbose configuration for development
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            ansi_colors: true,
            span_events: true,
            module_levels: vec![
                ("dermasense".to_string(), LogLevel::Debug),
                ("tower_http".to_string(), LogLevel::Debug),
                ("hyper".to_string(), LogLevel::Info),
            ],
            include_target: true,
            include_location: true,
            include_thread_id: false,
        }
    }

    /// Pick a preset from the `LOG_FORMAT` value: `json` is production,
    /// `pretty` is development, anything else defers to [`LogConfig::from_env`].
    pub fn for_format(format: Option<&str>) -> Self {
        match format.map(|f| f.to_lowercase()).as_deref() {
            Some("json") => Self::production(),
            Some("pretty") => Self::development(),
            _ => Self::from_env(),
        }
    }

    /// Build the env filter string
    fn build_filter(&self) -> String {
        let mut filter = self.level.as_str().to_string();

        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.as_str()));
        }

        filter
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    // RUST_LOG wins over the configured levels
    let filter = match std::env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(config.build_filter()),
    };

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.include_target)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread_id)
                    .with_span_events(span_events)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(config.include_target)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread_id)
                    .with_span_events(span_events)
                    .with_ansi(config.ansi_colors),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.include_target)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread_id)
                    .with_span_events(span_events)
                    .with_ansi(config.ansi_colors),
            )
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::parse("trace"), LogLevel::Trace);
        assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("Info"), LogLevel::Info);
        assert_eq!(LogLevel::parse("WARN"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("invalid"), LogLevel::Info);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_build_filter() {
        let config = LogConfig {
            level: LogLevel::Warn,
            module_levels: vec![
                ("dermasense_api".to_string(), LogLevel::Debug),
                ("hyper".to_string(), LogLevel::Error),
            ],
            ..LogConfig::default()
        };

        let filter = config.build_filter();
        assert_eq!(filter, "warn,dermasense_api=debug,hyper=error");
    }

    #[test]
    fn test_for_format_selects_preset() {
        let json = LogConfig::for_format(Some("JSON"));
        assert_eq!(json.format, LogFormat::Json);
        assert_eq!(json.level, LogLevel::Info);

        let pretty = LogConfig::for_format(Some("pretty"));
        assert_eq!(pretty.format, LogFormat::Pretty);
        assert_eq!(pretty.level, LogLevel::Debug);
        assert!(pretty.span_events);
        assert!(pretty.build_filter().contains("dermasense=debug"));
    }

    #[test]
    fn test_production_is_json() {
        let config = LogConfig::production();
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.ansi_colors);
        assert!(config.build_filter().contains("tower_http=warn"));
    }
}
