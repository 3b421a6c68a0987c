//! Main configuration types.
//!
//! This module provides the top-level [`MiddleConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use middle_telemetry::{
    LogConfig, ReporterBackend, ReporterConfig, TelemetryConfig, TracingConfig,
};

use crate::{ConfigError, LogFormat, ReporterKind, TelemetrySection};

/// Complete `middle` configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use middle_config::MiddleConfig;
///
/// let config = MiddleConfig::default();
/// assert_eq!(config.telemetry.service_name, "middle-service");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MiddleConfig {
    /// Telemetry configuration (logging, tracing, reporting).
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl MiddleConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> MiddleConfigBuilder {
        MiddleConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The service name is empty
    /// - Sampling ratio is not in 0.0..=1.0
    /// - The flush timeout is zero
    /// - The otel reporter is selected without tracing enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        let telemetry = &self.telemetry;

        if telemetry.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.service_name",
                "must not be empty",
            ));
        }

        if !(0.0..=1.0).contains(&telemetry.tracing.sampling_ratio) {
            return Err(ConfigError::invalid_value(
                "telemetry.tracing.sampling_ratio",
                "must be between 0.0 and 1.0",
            ));
        }

        if telemetry.reporter.flush_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "telemetry.reporter.flush_timeout_ms",
                "must be greater than zero",
            ));
        }

        if telemetry.reporter.backend == ReporterKind::Otel && !telemetry.tracing.enabled {
            return Err(ConfigError::validation_error(
                "telemetry.tracing.enabled must be true when telemetry.reporter.backend is 'otel'",
            ));
        }

        self.telemetry_config().validate()?;
        Ok(())
    }

    /// Converts the telemetry section into a [`TelemetryConfig`].
    ///
    /// # Example
    ///
    /// ```
    /// use middle_config::MiddleConfig;
    ///
    /// let config = MiddleConfig::development().telemetry_config();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let section = &self.telemetry;
        let defaults = TracingConfig::default();

        let tracing = TracingConfig {
            enabled: section.tracing.enabled,
            otlp_endpoint: section
                .tracing
                .otlp_endpoint
                .clone()
                .unwrap_or(defaults.otlp_endpoint),
            sample_ratio: section.tracing.sampling_ratio,
            ..defaults
        };

        let logging = LogConfig {
            enabled: section.logging.enabled,
            level: section.logging.level.clone(),
            json_format: section.logging.format == LogFormat::Json,
            span_events: section.logging.span_events,
            file_line_info: section.logging.include_location,
            ..LogConfig::default()
        };

        let backend = match section.reporter.backend {
            ReporterKind::Tracing => ReporterBackend::Tracing,
            ReporterKind::Otel => ReporterBackend::Otel,
        };

        let mut builder = TelemetryConfig::builder()
            .service_name(&section.service_name)
            .environment(&section.environment)
            .tracing(tracing)
            .logging(logging)
            .reporter(ReporterConfig {
                backend,
                flush_timeout: Duration::from_millis(section.reporter.flush_timeout_ms),
            });
        if let Some(version) = &section.service_version {
            builder = builder.service_version(version);
        }
        builder.build()
    }

    /// Create a development configuration preset.
    ///
    /// Pretty debug-level logs with source locations.
    ///
    /// # Example
    ///
    /// ```
    /// use middle_config::MiddleConfig;
    ///
    /// let config = MiddleConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.logging.span_events = true;
        config.telemetry.environment = "development".to_string();

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON info-level logs, OTLP tracing sampled at 10%, and panic reports
    /// through OpenTelemetry.
    ///
    /// # Example
    ///
    /// ```
    /// use middle_config::{LogFormat, MiddleConfig};
    ///
    /// let config = MiddleConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.environment = "production".to_string();

        config.telemetry.tracing.enabled = true;
        config.telemetry.tracing.sampling_ratio = 0.1;
        config.telemetry.reporter.backend = ReporterKind::Otel;

        config
    }
}

/// Builder for [`MiddleConfig`].
#[derive(Debug, Default)]
pub struct MiddleConfigBuilder {
    telemetry: Option<TelemetrySection>,
}

impl MiddleConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> MiddleConfig {
        MiddleConfig {
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<MiddleConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReporterSection, TracingSection};

    #[test]
    fn test_default_config() {
        let config = MiddleConfig::default();
        assert_eq!(config.telemetry.service_name, "middle-service");
        assert!(!config.telemetry.tracing.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_telemetry() {
        let config = MiddleConfig::builder()
            .telemetry(TelemetrySection {
                service_name: "billing".to_string(),
                ..Default::default()
            })
            .build();

        assert_eq!(config.telemetry.service_name, "billing");
        assert_eq!(config.telemetry.environment, "development");
    }

    #[test]
    fn test_validate_empty_service_name() {
        let config = MiddleConfig::builder()
            .telemetry(TelemetrySection {
                service_name: " ".to_string(),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("service_name"));
    }

    #[test]
    fn test_validate_invalid_sampling_ratio() {
        let config = MiddleConfig::builder()
            .telemetry(TelemetrySection {
                tracing: TracingSection {
                    sampling_ratio: 2.0,
                    ..Default::default()
                },
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sampling_ratio"));
    }

    #[test]
    fn test_validate_zero_flush_timeout() {
        let config = MiddleConfig::builder()
            .telemetry(TelemetrySection {
                reporter: ReporterSection {
                    flush_timeout_ms: 0,
                    ..Default::default()
                },
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("flush_timeout_ms"));
    }

    #[test]
    fn test_validate_otel_without_tracing() {
        let result = MiddleConfig::builder()
            .telemetry(TelemetrySection {
                reporter: ReporterSection {
                    backend: ReporterKind::Otel,
                    ..Default::default()
                },
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("tracing.enabled"));
    }

    #[test]
    fn test_telemetry_config_conversion() {
        let mut config = MiddleConfig::production();
        config.telemetry.service_name = "billing".to_string();
        config.telemetry.service_version = Some("2.1.0".to_string());
        config.telemetry.tracing.otlp_endpoint = Some("http://collector:4317".to_string());
        config.telemetry.reporter.flush_timeout_ms = 750;

        let telemetry = config.telemetry_config();
        assert_eq!(telemetry.service_name, "billing");
        assert_eq!(telemetry.service_version, "2.1.0");
        assert_eq!(telemetry.tracing.service_name, "billing");
        assert_eq!(telemetry.tracing.otlp_endpoint, "http://collector:4317");
        assert!((telemetry.tracing.sample_ratio - 0.1).abs() < f64::EPSILON);
        assert!(telemetry.logging.json_format);
        assert_eq!(telemetry.reporter.backend, ReporterBackend::Otel);
        assert_eq!(telemetry.reporter.flush_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_development_preset() {
        let config = MiddleConfig::development();
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(config.telemetry.logging.include_location);

        let telemetry = config.telemetry_config();
        assert!(!telemetry.logging.json_format);
        assert!(telemetry.logging.file_line_info);
        assert_eq!(telemetry.reporter.backend, ReporterBackend::Tracing);
    }

    #[test]
    fn test_production_preset() {
        let config = MiddleConfig::production();
        assert!(config.telemetry.tracing.enabled);
        assert_eq!(config.telemetry.reporter.backend, ReporterKind::Otel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = MiddleConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[telemetry]"));
        assert!(toml_str.contains("[telemetry.reporter]"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let toml_str = r#"
            [server]
            http_addr = "127.0.0.1:8000"
        "#;

        let result: Result<MiddleConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }
}
