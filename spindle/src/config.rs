//! Engine configuration: an explicit validated struct.
//!
//! Environment variables (after `dotenv`) populate [`EngineConfig::from_env`]
//! once at start-up; afterwards the engine reads no environment. Every
//! recognized option is enumerated here; unknown knobs do not exist.

use std::time::Duration;

use crate::approval::DEFAULT_APPROVAL_TIMEOUT;
use crate::error::ValidationError;
use crate::memory::DEFAULT_EMBEDDING_DIMENSION;
use crate::research::{DEFAULT_QUALITY_THRESHOLD, MAX_RESEARCH_ITERATIONS};

/// Opaque model-access parameters (`MODEL_*`).
#[derive(Clone, Debug, Default)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model_name: String,
}

/// Validated engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Storage location (SQLite file path). `None` selects the in-memory
    /// backend.
    pub database_url: Option<String>,
    /// Embedding dimension; must match the vector index schema.
    pub vector_dimension: usize,
    /// Requested iteration cap. State construction clamps it to
    /// [`MAX_RESEARCH_ITERATIONS`] regardless of what is configured here.
    pub max_iterations: u32,
    pub quality_threshold: f64,
    pub approval_timeout: Duration,
    pub tool_call_timeout: Duration,
    /// OTLP endpoint, the literal `memory`, or `None`.
    pub otel_exporter_endpoint: Option<String>,
    pub otel_service_name: String,
    pub otel_sampling_rate: f64,
    pub model: ModelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            vector_dimension: DEFAULT_EMBEDDING_DIMENSION,
            max_iterations: MAX_RESEARCH_ITERATIONS,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            tool_call_timeout: Duration::from_secs(30),
            otel_exporter_endpoint: None,
            otel_service_name: "spindle".to_string(),
            otel_sampling_rate: 1.0,
            model: ModelConfig {
                api_key: None,
                base_url: None,
                model_name: "gpt-4o-mini".to_string(),
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ValidationError> {
    value
        .parse::<T>()
        .map_err(|_| ValidationError::Config(format!("{} is not valid: {}", name, value)))
}

impl EngineConfig {
    /// Loads from the process environment (after `dotenv`), validating every
    /// recognized option.
    pub fn from_env() -> Result<Self, ValidationError> {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Ok(value) = std::env::var("DATABASE_URL") {
            if !value.trim().is_empty() {
                config.database_url = Some(value);
            }
        }
        if let Ok(value) = std::env::var("VECTOR_DIMENSION") {
            config.vector_dimension = parse_var("VECTOR_DIMENSION", &value)?;
        }
        if let Ok(value) = std::env::var("MAX_ITERATIONS") {
            config.max_iterations = parse_var("MAX_ITERATIONS", &value)?;
        }
        if let Ok(value) = std::env::var("QUALITY_THRESHOLD") {
            config.quality_threshold = parse_var("QUALITY_THRESHOLD", &value)?;
        }
        if let Ok(value) = std::env::var("APPROVAL_TIMEOUT_SECONDS") {
            config.approval_timeout =
                Duration::from_secs(parse_var("APPROVAL_TIMEOUT_SECONDS", &value)?);
        }
        if let Ok(value) = std::env::var("TOOL_CALL_TIMEOUT_SECONDS") {
            config.tool_call_timeout =
                Duration::from_secs(parse_var("TOOL_CALL_TIMEOUT_SECONDS", &value)?);
        }
        if let Ok(value) = std::env::var("OTEL_EXPORTER_ENDPOINT") {
            if !value.trim().is_empty() {
                config.otel_exporter_endpoint = Some(value);
            }
        }
        if let Ok(value) = std::env::var("OTEL_SERVICE_NAME") {
            config.otel_service_name = value;
        }
        if let Ok(value) = std::env::var("OTEL_SAMPLING_RATE") {
            config.otel_sampling_rate = parse_var("OTEL_SAMPLING_RATE", &value)?;
        }
        if let Ok(value) = std::env::var("MODEL_API_KEY") {
            config.model.api_key = Some(value);
        }
        if let Ok(value) = std::env::var("MODEL_BASE_URL") {
            config.model.base_url = Some(value);
        }
        if let Ok(value) = std::env::var("MODEL_NAME") {
            config.model.model_name = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.vector_dimension == 0 {
            return Err(ValidationError::Config(
                "vector_dimension must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ValidationError::Config(
                "quality_threshold must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.otel_sampling_rate) {
            return Err(ValidationError::Config(
                "otel_sampling_rate must be in [0, 1]".into(),
            ));
        }
        if self.tool_call_timeout.is_zero() || self.approval_timeout.is_zero() {
            return Err(ValidationError::Config("timeouts must be positive".into()));
        }
        Ok(())
    }

    /// The telemetry slice of this configuration.
    pub fn telemetry(&self) -> crate::telemetry::TelemetryConfig {
        crate::telemetry::TelemetryConfig {
            endpoint: self.otel_exporter_endpoint.clone(),
            service_name: self.otel_service_name.clone(),
            sampling_rate: self.otel_sampling_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.vector_dimension, 1536);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.quality_threshold, 0.8);
        assert_eq!(config.approval_timeout, Duration::from_secs(300));
        assert_eq!(config.tool_call_timeout, Duration::from_secs(30));
        assert_eq!(config.otel_sampling_rate, 1.0);
        config.validate().unwrap();
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = EngineConfig::default();
        config.quality_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.vector_dimension = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.otel_sampling_rate = -0.1;
        assert!(config.validate().is_err());
    }
}
