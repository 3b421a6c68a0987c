//! `tracing` backend.

use super::{Defaults, ScopeTemplate};
use middle_core::{Error, EventId, Level, Reporter, Request, Scope, Span, SpanOptions, SpanStatus};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::field::Empty;

/// Reports through the `tracing` subscriber.
///
/// Request spans are `info`-level `tracing` spans named `request`, with the
/// transaction name in `otel.name`. Panic reports are `error` events.
///
/// # Example
///
/// ```
/// use middle_core::{Reporter, Scope, Level};
/// use middle_telemetry::reporter::TracingReporter;
///
/// let reporter = TracingReporter::new();
/// reporter.set_default_tag("region", "eu-west-1");
///
/// let mut scope = reporter.fork_scope();
/// scope.set_level(Level::Fatal);
/// assert_eq!(reporter.default_level(), Level::Info);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    defaults: Defaults,
}

impl TracingReporter {
    /// Creates a reporter with an empty default scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level of the process-wide default scope.
    pub fn set_default_level(&self, level: Level) {
        self.defaults.set_level(level);
    }

    /// Sets a tag on the process-wide default scope.
    pub fn set_default_tag(&self, key: &str, value: &str) {
        self.defaults.set_tag(key, value);
    }

    /// Returns the level of the process-wide default scope.
    #[must_use]
    pub fn default_level(&self) -> Level {
        self.defaults.level()
    }
}

impl Reporter for TracingReporter {
    type Scope = TracingScope;
    type Span = TracingSpan;

    fn fork_scope(&self) -> TracingScope {
        TracingScope {
            template: self.defaults.fork(),
            method: None,
            path: None,
        }
    }

    fn start_span(&self, name: &str, options: SpanOptions) -> TracingSpan {
        let span = tracing::info_span!(
            "request",
            otel.name = name,
            otel.kind = "server",
            op = options.op,
            source = options.source.as_str(),
            trace_id = Empty,
            parent_span_id = Empty,
            status = Empty,
            kind = Empty,
        );
        if let Some(parent) = &options.parent {
            span.record("trace_id", parent.trace_id.as_str());
            span.record("parent_span_id", parent.parent_span_id.as_str());
        }

        TracingSpan {
            span,
            started: Instant::now(),
            status: None,
            tags: BTreeMap::new(),
            finished: false,
        }
    }
}

/// Request-local scope of a [`TracingReporter`].
#[derive(Debug, Clone)]
pub struct TracingScope {
    template: ScopeTemplate,
    method: Option<String>,
    path: Option<String>,
}

impl TracingScope {
    /// Returns the scope's level.
    #[must_use]
    pub fn level(&self) -> Level {
        self.template.level
    }

    /// Sets a tag included in reports from this scope.
    pub fn set_tag(&mut self, key: &str, value: &str) {
        self.template
            .tags
            .insert(key.to_string(), value.to_string());
    }

    /// Returns the scope's tags.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.template.tags
    }
}

impl Scope for TracingScope {
    fn set_request(&mut self, request: &Request) {
        self.method = Some(request.method().to_string());
        self.path = Some(request.uri().path().to_string());
    }

    fn set_level(&mut self, level: Level) {
        self.template.level = level;
    }

    fn recover(&mut self, request: &Request, error: &Error) -> Option<EventId> {
        let id = EventId::new();
        let method = self
            .method
            .clone()
            .unwrap_or_else(|| request.method().to_string());
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| request.uri().path().to_string());

        tracing::error!(
            event_id = %id,
            level = %self.template.level,
            http.method = %method,
            http.path = %path,
            tags = ?self.template.tags,
            error = %error,
            "panic recovered"
        );
        Some(id)
    }

    /// Events are written synchronously by the subscriber, so there is
    /// nothing to wait for.
    fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Request span of a [`TracingReporter`].
#[derive(Debug)]
pub struct TracingSpan {
    span: tracing::Span,
    started: Instant,
    status: Option<SpanStatus>,
    tags: BTreeMap<String, String>,
    finished: bool,
}

impl TracingSpan {
    /// Returns the underlying `tracing` span.
    ///
    /// Enter it to make spans and events created by a step its children.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Returns the last status set.
    #[must_use]
    pub fn status(&self) -> Option<SpanStatus> {
        self.status
    }

    /// Returns the tags set so far.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Returns true once the span has been finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Span for TracingSpan {
    fn set_status(&mut self, status: SpanStatus) {
        self.status = Some(status);
        self.span.record("status", status.as_str());
    }

    fn set_tag(&mut self, key: &str, value: &str) {
        if key == "kind" {
            self.span.record("kind", value);
        } else {
            tracing::debug!(parent: &self.span, tag = key, value, "span tag");
        }
        self.tags.insert(key.to_string(), value.to_string());
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            parent: &self.span,
            elapsed_ms,
            status = self.status.map_or("unset", SpanStatus::as_str),
            "request span finished"
        );
        // Dropping the last handle closes the span.
        self.span = tracing::Span::none();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use middle_core::TraceContext;

    fn request() -> Request {
        http::Request::post("/payments").body(Bytes::new()).unwrap()
    }

    #[test]
    fn test_scope_inherits_default_tags() {
        let reporter = TracingReporter::new();
        reporter.set_default_tag("region", "eu");

        let mut scope = reporter.fork_scope();
        scope.set_tag("tenant", "acme");

        assert_eq!(scope.tags().len(), 2);
        assert_eq!(reporter.fork_scope().tags().len(), 1);
    }

    #[test]
    fn test_recover_returns_event_id() {
        let reporter = TracingReporter::new();
        let mut scope = reporter.fork_scope();
        scope.set_request(&request());
        scope.set_level(Level::Fatal);

        let id = scope.recover(&request(), &anyhow::anyhow!("panic: boom"));
        assert!(id.is_some());
        assert!(scope.flush(Duration::from_millis(10)));
    }

    #[test]
    fn test_span_records_status_and_tags() {
        let reporter = TracingReporter::new();
        let options = SpanOptions {
            parent: TraceContext::parse(
                "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            ),
            ..SpanOptions::default()
        };

        let mut span = reporter.start_span("POST /payments", options);
        span.set_status(SpanStatus::InternalError);
        span.set_tag("kind", "panic");

        assert_eq!(span.status(), Some(SpanStatus::InternalError));
        assert_eq!(span.tags()["kind"], "panic");
        assert!(!span.is_finished());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let reporter = TracingReporter::new();
        let mut span = reporter.start_span("GET /", SpanOptions::default());

        span.finish();
        span.finish();
        assert!(span.is_finished());
        assert!(span.span().is_none());
    }
}
