//! Reporting backends for observability-wrapped chains.
//!
//! - [`TracingReporter`] records request spans as `tracing` spans and panic
//!   reports as `error` events, so they reach whatever subscriber
//!   [`init_logging`](crate::logging::init_logging) installed.
//! - [`OtelReporter`] records request spans as OpenTelemetry server spans
//!   and panic reports as exception spans in the same trace.
//! - [`ConfiguredReporter`] picks one of the two at runtime from
//!   [`ReporterBackend`](crate::config::ReporterBackend).
//!
//! Both backends keep a process-wide default scope template. Every request
//! forks its own copy, so steps can change their scope without locking and
//! without affecting other requests.

mod otel;
mod subscriber;

pub use otel::{OtelReporter, OtelScope, OtelSpan};
pub use subscriber::{TracingReporter, TracingScope, TracingSpan};

use middle_core::{Error, EventId, Level, Reporter, Request, Scope, Span, SpanOptions, SpanStatus};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Default scope values shared by every request.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeTemplate {
    pub(crate) level: Level,
    pub(crate) tags: BTreeMap<String, String>,
}

/// The process-wide default scope of a backend.
#[derive(Debug, Clone, Default)]
pub(crate) struct Defaults(Arc<RwLock<ScopeTemplate>>);

impl Defaults {
    pub(crate) fn fork(&self) -> ScopeTemplate {
        self.0.read().clone()
    }

    pub(crate) fn set_level(&self, level: Level) {
        self.0.write().level = level;
    }

    pub(crate) fn set_tag(&self, key: &str, value: &str) {
        self.0.write().tags.insert(key.to_string(), value.to_string());
    }

    pub(crate) fn level(&self) -> Level {
        self.0.read().level
    }
}

/// A reporter whose backend is chosen at runtime.
#[derive(Debug, Clone)]
pub enum ConfiguredReporter {
    /// Reports through `tracing`.
    Tracing(TracingReporter),
    /// Reports through OpenTelemetry.
    Otel(OtelReporter),
}

/// Scope of a [`ConfiguredReporter`].
#[derive(Debug)]
pub enum ConfiguredScope {
    /// Scope of the `tracing` backend.
    Tracing(TracingScope),
    /// Scope of the OpenTelemetry backend.
    Otel(OtelScope),
}

/// Span of a [`ConfiguredReporter`].
#[derive(Debug)]
pub enum ConfiguredSpan {
    /// Span of the `tracing` backend.
    Tracing(TracingSpan),
    /// Span of the OpenTelemetry backend.
    Otel(OtelSpan),
}

impl ConfiguredReporter {
    /// Sets the level of the process-wide default scope.
    pub fn set_default_level(&self, level: Level) {
        match self {
            Self::Tracing(reporter) => reporter.set_default_level(level),
            Self::Otel(reporter) => reporter.set_default_level(level),
        }
    }

    /// Sets a tag on the process-wide default scope.
    pub fn set_default_tag(&self, key: &str, value: &str) {
        match self {
            Self::Tracing(reporter) => reporter.set_default_tag(key, value),
            Self::Otel(reporter) => reporter.set_default_tag(key, value),
        }
    }
}

impl Reporter for ConfiguredReporter {
    type Scope = ConfiguredScope;
    type Span = ConfiguredSpan;

    fn fork_scope(&self) -> ConfiguredScope {
        match self {
            Self::Tracing(reporter) => ConfiguredScope::Tracing(reporter.fork_scope()),
            Self::Otel(reporter) => ConfiguredScope::Otel(reporter.fork_scope()),
        }
    }

    fn start_span(&self, name: &str, options: SpanOptions) -> ConfiguredSpan {
        match self {
            Self::Tracing(reporter) => ConfiguredSpan::Tracing(reporter.start_span(name, options)),
            Self::Otel(reporter) => ConfiguredSpan::Otel(reporter.start_span(name, options)),
        }
    }

    fn bind_span(&self, scope: &mut ConfiguredScope, span: &ConfiguredSpan) {
        match (self, scope, span) {
            (
                Self::Tracing(reporter),
                ConfiguredScope::Tracing(scope),
                ConfiguredSpan::Tracing(span),
            ) => reporter.bind_span(scope, span),
            (Self::Otel(reporter), ConfiguredScope::Otel(scope), ConfiguredSpan::Otel(span)) => {
                reporter.bind_span(scope, span);
            }
            // A reporter only pairs its own scopes and spans.
            _ => {}
        }
    }
}

impl Scope for ConfiguredScope {
    fn set_request(&mut self, request: &Request) {
        match self {
            Self::Tracing(scope) => scope.set_request(request),
            Self::Otel(scope) => scope.set_request(request),
        }
    }

    fn set_level(&mut self, level: Level) {
        match self {
            Self::Tracing(scope) => scope.set_level(level),
            Self::Otel(scope) => scope.set_level(level),
        }
    }

    fn recover(&mut self, request: &Request, error: &Error) -> Option<EventId> {
        match self {
            Self::Tracing(scope) => scope.recover(request, error),
            Self::Otel(scope) => scope.recover(request, error),
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        match self {
            Self::Tracing(scope) => scope.flush(timeout),
            Self::Otel(scope) => scope.flush(timeout),
        }
    }
}

impl Span for ConfiguredSpan {
    fn set_status(&mut self, status: SpanStatus) {
        match self {
            Self::Tracing(span) => span.set_status(status),
            Self::Otel(span) => span.set_status(status),
        }
    }

    fn set_tag(&mut self, key: &str, value: &str) {
        match self {
            Self::Tracing(span) => span.set_tag(key, value),
            Self::Otel(span) => span.set_tag(key, value),
        }
    }

    fn finish(&mut self) {
        match self {
            Self::Tracing(span) => span.finish(),
            Self::Otel(span) => span.finish(),
        }
    }
}
