//! OpenTelemetry trace pipeline with OTLP export.
//!
//! # Example
//!
//! ```rust,ignore
//! use middle_telemetry::otlp::{init_tracing, TracingConfig};
//!
//! let provider = init_tracing(&TracingConfig::default())?;
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use middle_core::TraceContext;
use opentelemetry::trace::{
    SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
};
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, TracerProvider};
use opentelemetry_sdk::Resource;

/// Name of the tracer that records request spans.
pub const TRACER_NAME: &str = "middle";

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    /// Whether the OTLP pipeline is installed.
    pub enabled: bool,

    /// OTLP endpoint (e.g., `http://localhost:4317`).
    pub otlp_endpoint: String,

    /// Service name for spans.
    pub service_name: String,

    /// Service version.
    pub service_version: String,

    /// Deployment environment.
    pub environment: String,

    /// Sampling ratio (0.0 to 1.0).
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "middle".to_string(),
            service_version: "0.1.0".to_string(),
            environment: "development".to_string(),
            sample_ratio: 1.0,
        }
    }
}

impl TracingConfig {
    /// Creates a production configuration sampling 10% of traces.
    #[must_use]
    pub fn production(service_name: &str, version: &str) -> Self {
        Self {
            enabled: true,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: service_name.to_string(),
            service_version: version.to_string(),
            environment: "production".to_string(),
            sample_ratio: 0.1,
        }
    }

    fn sampler(&self) -> Sampler {
        if self.sample_ratio >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sample_ratio <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sample_ratio)
        }
    }
}

/// Installs the global tracer provider.
///
/// Returns `None` when tracing is disabled. Must be called from within a
/// Tokio runtime, which drives the batch exporter.
///
/// # Errors
///
/// Returns `TelemetryError::TracingInit` if the exporter cannot be built.
pub fn init_tracing(config: &TracingConfig) -> TelemetryResult<Option<TracerProvider>> {
    if !config.enabled {
        return Ok(None);
    }

    let resource = Resource::new([
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
            config.service_version.clone(),
        ),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());
    tracing::debug!(endpoint = %config.otlp_endpoint, "otlp tracing initialized");

    Ok(Some(provider))
}

/// Shuts down the global tracer provider.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

/// Returns the tracer that records request spans.
#[must_use]
pub fn tracer() -> global::BoxedTracer {
    global::tracer(TRACER_NAME)
}

/// Builds a parent context for an upstream W3C trace.
///
/// Returns an empty context if the IDs cannot be converted.
#[must_use]
pub fn remote_context(parent: &TraceContext) -> Context {
    let (Ok(trace_id), Ok(span_id)) = (
        TraceId::from_hex(&parent.trace_id),
        SpanId::from_hex(&parent.parent_span_id),
    ) else {
        return Context::new();
    };

    let span_context = SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::new(parent.flags.0),
        true,
        TraceState::default(),
    );
    Context::new().with_remote_span_context(span_context)
}
