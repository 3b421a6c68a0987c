//! Logging, tracing and panic reporting for `middle` services.
//!
//! This crate wires the [`Reporter`](middle_core::Reporter) seam of
//! `middle-core` to real backends:
//!
//! - **Logging**: structured JSON or pretty output through `tracing-subscriber`
//! - **Tracing**: OpenTelemetry spans exported over OTLP
//! - **Reporting**: panic reports and request spans, through either of the above
//!
//! # Architecture
//!
//! ```text
//!   traced chain ──► ConfiguredReporter ──┬──► TracingReporter ──► subscriber (stdout)
//!                                         │
//!                                         └──► OtelReporter ────► OTLP collector
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use middle_telemetry::{init_telemetry, ReporterBackend, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TelemetryConfig::builder()
//!         .service_name("billing")
//!         .service_version("1.0.0")
//!         .otlp_endpoint("http://localhost:4317")
//!         .backend(ReporterBackend::Otel)
//!         .build();
//!
//!     let guard = init_telemetry(config)?;
//!     let reporter = guard.reporter()?;
//!     // hand `reporter` to `Pipeline::instrument` ...
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod otlp;
pub mod reporter;

pub use config::{ReporterBackend, ReporterConfig, TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use otlp::{init_tracing, shutdown_tracing, TracingConfig};
pub use reporter::{ConfiguredReporter, OtelReporter, TracingReporter};

use opentelemetry_sdk::trace::TracerProvider;
use std::time::Duration;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Guard that shuts down telemetry providers on drop.
///
/// Keep it alive for the lifetime of the application. Dropping it flushes
/// pending spans and shuts the tracer provider down.
pub struct TelemetryGuard {
    tracer_provider: Option<TracerProvider>,
    reporter: ReporterConfig,
}

impl TelemetryGuard {
    /// Creates a new telemetry guard.
    #[must_use]
    pub fn new(tracer_provider: Option<TracerProvider>, reporter: ReporterConfig) -> Self {
        Self {
            tracer_provider,
            reporter,
        }
    }

    /// Builds the reporter selected by the configuration.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::BackendUnavailable` when the OpenTelemetry
    /// backend was selected but no tracer provider was installed.
    pub fn reporter(&self) -> TelemetryResult<ConfiguredReporter> {
        match self.reporter.backend {
            ReporterBackend::Tracing => Ok(ConfiguredReporter::Tracing(TracingReporter::new())),
            ReporterBackend::Otel => match &self.tracer_provider {
                Some(provider) => Ok(ConfiguredReporter::Otel(OtelReporter::new(Some(
                    provider.clone(),
                )))),
                None => Err(TelemetryError::BackendUnavailable(
                    ReporterBackend::Otel.as_str(),
                )),
            },
        }
    }

    /// Returns the configured bound on post-panic flushes.
    #[must_use]
    pub fn flush_timeout(&self) -> Duration {
        self.reporter.flush_timeout
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("tracing", &self.tracer_provider.is_some())
            .field("reporter", &self.reporter)
            .finish()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            for result in provider.force_flush() {
                if let Err(e) = result {
                    eprintln!("Error flushing tracer provider: {e}");
                }
            }
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {e}");
            }
        }
    }
}

/// Initializes all telemetry subsystems.
///
/// Validates the configuration, installs the logging subscriber, then the
/// OTLP trace pipeline when tracing is enabled.
///
/// # Errors
///
/// Returns `TelemetryError` if the configuration is invalid or any
/// subsystem fails to initialize.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    config.validate()?;

    init_logging(&config.logging)?;
    let tracer_provider = init_tracing(&config.tracing)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        backend = %config.reporter.backend,
        "telemetry initialized"
    );

    Ok(TelemetryGuard::new(tracer_provider, config.reporter))
}
