//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::otlp::TracingConfig;
use crate::TelemetryResult;
use crate::error::TelemetryError;
use middle_core::DEFAULT_FLUSH_TIMEOUT;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which backend reports panics and records request spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReporterBackend {
    /// `tracing` spans and events, rendered by the logging subscriber.
    #[default]
    Tracing,
    /// OpenTelemetry spans exported over OTLP.
    Otel,
}

impl ReporterBackend {
    /// Returns the configuration name of the backend.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tracing => "tracing",
            Self::Otel => "otel",
        }
    }
}

impl fmt::Display for ReporterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReporterBackend {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tracing" => Ok(Self::Tracing),
            "otel" | "opentelemetry" => Ok(Self::Otel),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown reporter backend: {other}"
            ))),
        }
    }
}

/// Reporter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    /// Backend used for reports and request spans.
    pub backend: ReporterBackend,

    /// Upper bound on the flush that follows a reported panic.
    pub flush_timeout: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            backend: ReporterBackend::Tracing,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name (used in traces and logs).
    pub service_name: String,

    /// Service version.
    pub service_version: String,

    /// Environment (production, staging, development).
    pub environment: String,

    /// OTLP tracing configuration.
    pub tracing: TracingConfig,

    /// Logging configuration.
    pub logging: LogConfig,

    /// Reporter configuration.
    pub reporter: ReporterConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }

    /// Checks the configuration for values no backend can use.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "service name must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.tracing.sample_ratio) {
            return Err(TelemetryError::InvalidConfig(format!(
                "sample ratio must be between 0 and 1, got {}",
                self.tracing.sample_ratio
            )));
        }
        if self.reporter.flush_timeout.is_zero() {
            return Err(TelemetryError::InvalidConfig(
                "flush timeout must be greater than zero".to_string(),
            ));
        }
        if self.reporter.backend == ReporterBackend::Otel && !self.tracing.enabled {
            return Err(TelemetryError::InvalidConfig(
                "the otel reporter requires tracing to be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "middle-service".to_string(),
            service_version: "0.1.0".to_string(),
            environment: "development".to_string(),
            tracing: TracingConfig::default(),
            logging: LogConfig::default(),
            reporter: ReporterConfig::default(),
        }
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    service_version: Option<String>,
    environment: Option<String>,
    tracing: Option<TracingConfig>,
    logging: Option<LogConfig>,
    reporter: Option<ReporterConfig>,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Sets the service version.
    #[must_use]
    pub fn service_version(mut self, version: &str) -> Self {
        self.service_version = Some(version.to_string());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, env: &str) -> Self {
        self.environment = Some(env.to_string());
        self
    }

    /// Sets the tracing configuration.
    #[must_use]
    pub fn tracing(mut self, config: TracingConfig) -> Self {
        self.tracing = Some(config);
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Sets the reporter configuration.
    #[must_use]
    pub fn reporter(mut self, config: ReporterConfig) -> Self {
        self.reporter = Some(config);
        self
    }

    /// Sets the OTLP endpoint for tracing.
    #[must_use]
    pub fn otlp_endpoint(mut self, endpoint: &str) -> Self {
        let config = self.tracing.take().unwrap_or_default();
        self.tracing = Some(TracingConfig {
            enabled: true,
            otlp_endpoint: endpoint.to_string(),
            ..config
        });
        self
    }

    /// Selects the reporter backend.
    #[must_use]
    pub fn backend(mut self, backend: ReporterBackend) -> Self {
        let config = self.reporter.take().unwrap_or_default();
        self.reporter = Some(ReporterConfig { backend, ..config });
        self
    }

    /// Sets the post-panic flush timeout.
    #[must_use]
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        let config = self.reporter.take().unwrap_or_default();
        self.reporter = Some(ReporterConfig {
            flush_timeout: timeout,
            ..config
        });
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();

        let service_name = self.service_name.unwrap_or(defaults.service_name);
        let service_version = self.service_version.unwrap_or(defaults.service_version);
        let environment = self.environment.unwrap_or(defaults.environment);

        // Update sub-configs with service info
        let mut tracing = self.tracing.unwrap_or(defaults.tracing);
        tracing.service_name = service_name.clone();
        tracing.service_version = service_version.clone();
        tracing.environment = environment.clone();

        let mut logging = self.logging.unwrap_or(defaults.logging);
        logging.service_name = service_name.clone();

        TelemetryConfig {
            service_name,
            service_version,
            environment,
            tracing,
            logging,
            reporter: self.reporter.unwrap_or(defaults.reporter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "middle-service");
        assert_eq!(config.environment, "development");
        assert_eq!(config.reporter.backend, ReporterBackend::Tracing);
        assert_eq!(config.reporter.flush_timeout, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_propagates_service_name() {
        let config = TelemetryConfig::builder()
            .service_name("billing")
            .service_version("2.0.0")
            .environment("production")
            .build();

        assert_eq!(config.tracing.service_name, "billing");
        assert_eq!(config.tracing.service_version, "2.0.0");
        assert_eq!(config.tracing.environment, "production");
        assert_eq!(config.logging.service_name, "billing");
    }

    #[test]
    fn test_builder_reporter_settings() {
        let config = TelemetryConfig::builder()
            .backend(ReporterBackend::Otel)
            .flush_timeout(Duration::from_millis(500))
            .otlp_endpoint("http://collector:4317")
            .build();

        assert_eq!(config.reporter.backend, ReporterBackend::Otel);
        assert_eq!(config.reporter.flush_timeout, Duration::from_millis(500));
        assert_eq!(config.tracing.otlp_endpoint, "http://collector:4317");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("tracing".parse::<ReporterBackend>().unwrap(), ReporterBackend::Tracing);
        assert_eq!("OTEL".parse::<ReporterBackend>().unwrap(), ReporterBackend::Otel);
        assert!("sentry".parse::<ReporterBackend>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TelemetryConfig::default();
        config.tracing.sample_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = TelemetryConfig::default();
        config.reporter.flush_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = TelemetryConfig::default();
        config.tracing.enabled = false;
        config.reporter.backend = ReporterBackend::Otel;
        assert!(config.validate().is_err());
    }
}
