use crate::error::{AppError, Result};
use crate::ml::{FeatureSchema, RiskPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Model configuration
    pub model: ModelConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (e.g. FAILURE_PREDICTOR__MODEL__PATH)
            .add_source(
                config::Environment::with_prefix("FAILURE_PREDICTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.model.risk_policy()?;
        self.model.fallback_schema()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path of the model artifact
    #[serde(default = "default_model_path")]
    pub path: PathBuf,

    /// Label of the no-failure class
    #[serde(default = "default_no_failure_label")]
    pub no_failure_label: String,

    /// Aggregate risk above which a warning is raised
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: f64,

    /// Feature schema for models that do not record feature names
    #[serde(default)]
    pub feature_schema: Option<Vec<String>>,
}

impl ModelConfig {
    pub fn risk_policy(&self) -> Result<RiskPolicy> {
        RiskPolicy::new(self.no_failure_label.clone(), self.risk_threshold)
    }

    pub fn fallback_schema(&self) -> Result<Option<FeatureSchema>> {
        self.feature_schema
            .as_ref()
            .map(|names| {
                FeatureSchema::new(names.iter().cloned())
                    .map_err(|e| AppError::Configuration(format!("model.feature_schema: {}", e)))
            })
            .transpose()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            no_failure_label: default_no_failure_label(),
            risk_threshold: default_risk_threshold(),
            feature_schema: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/model.json")
}

fn default_no_failure_label() -> String {
    crate::ml::DEFAULT_NO_FAILURE_LABEL.to_string()
}

fn default_risk_threshold() -> f64 {
    crate::ml::DEFAULT_RISK_THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "failure-predictor".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_no_failure_label(), "No Failure");
        assert_eq!(default_risk_threshold(), 0.20);
        assert!(default_true());
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.model.risk_threshold, 0.20);
        assert!(config.model.feature_schema.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = Config::default();
        config.model.risk_threshold = 1.5;
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_invalid_feature_schema_rejected() {
        let mut config = Config::default();
        config.model.feature_schema = Some(vec!["Type_L".to_string(), "Type_L".to_string()]);
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));

        config.model.feature_schema = Some(vec!["Type_L".to_string(), "Type_M".to_string()]);
        assert_eq!(config.model.fallback_schema().unwrap().unwrap().len(), 2);
    }
}
