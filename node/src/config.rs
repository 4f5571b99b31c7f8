use dermasense_api::ApiConfig;
use dermasense_vision::{ModelSettings, SwinConfig, CLASS_NAMES};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Model configuration
    #[serde(default)]
    pub model: ModelSettings,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Origins allowed to call the API from a browser
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics on a separate listener
    #[serde(default)]
    pub enabled: bool,

    /// Metrics listen address
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_cors_origins() -> Vec<String> {
    ApiConfig::default().cors_origins
}

fn default_max_upload_bytes() -> usize {
    ApiConfig::default().max_upload_bytes
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9100))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

impl ServerConfig {
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            cors_origins: self.cors_origins.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl ServiceConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than zero".to_string());
        }

        for origin in &self.server.cors_origins {
            if origin == "*" {
                return Err(
                    "server.cors_origins cannot contain \"*\" because credentials are allowed"
                        .to_string(),
                );
            }
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(format!("Invalid CORS origin: {}", origin));
            }
        }

        if SwinConfig::from_model_name(&self.model.variant, CLASS_NAMES.len()).is_none() {
            return Err(format!("Unknown model variant: {}", self.model.variant));
        }

        if self.metrics.enabled && self.metrics.listen_addr == self.server.listen_addr {
            return Err("metrics.listen_addr must differ from server.listen_addr".to_string());
        }

        Ok(())
    }

    /// Load from file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dermasense_vision::DevicePreference;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8000);
        assert_eq!(config.server.cors_origins.len(), 4);
        assert_eq!(config.model.variant, "swin_tiny_patch4_window7_224");
        assert_eq!(
            config.model.weights_path,
            PathBuf::from("best_swin_dermnet_finetuned_v2.pth")
        );
        assert_eq!(config.model.device, DevicePreference::Auto);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [model]
            weights_path = "/models/swin.safetensors"
            device = "cpu"
            "#,
        )
        .unwrap();
        assert_eq!(config.model.weights_path, PathBuf::from("/models/swin.safetensors"));
        assert_eq!(config.model.device, DevicePreference::Cpu);
        assert_eq!(config.model.variant, "swin_tiny_patch4_window7_224");
        assert_eq!(config.server.listen_addr.port(), 8000);
    }

    #[test]
    fn test_validate_rejects_wildcard_origin() {
        let mut config = ServiceConfig::default();
        config.server.cors_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_variant() {
        let mut config = ServiceConfig::default();
        config.model.variant = "convnext_tiny".to_string();
        assert!(config.validate().unwrap_err().contains("convnext_tiny"));
    }

    #[test]
    fn test_validate_rejects_zero_upload_limit() {
        let mut config = ServiceConfig::default();
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_metrics_addr() {
        let mut config = ServiceConfig::default();
        config.metrics.enabled = true;
        config.metrics.listen_addr = config.server.listen_addr;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dermasense.toml");

        let mut config = ServiceConfig::default();
        config.model.checkpoint_key = Some("state_dict".to_string());
        config.metrics.enabled = true;
        config.save(&path).unwrap();

        let loaded = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.model.checkpoint_key.as_deref(), Some("state_dict"));
        assert!(loaded.metrics.enabled);
        assert_eq!(loaded.server.cors_origins, config.server.cors_origins);
    }
}
