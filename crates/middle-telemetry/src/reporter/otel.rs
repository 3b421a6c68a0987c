//! OpenTelemetry backend.

use super::{Defaults, ScopeTemplate};
use crate::otlp::{remote_context, tracer, TRACER_NAME};
use middle_core::{
    Error, EventId, Level, Reporter, Request, Scope, Span, SpanOptions, SpanStatus, TraceContext,
};
use opentelemetry::global::{BoxedSpan, BoxedTracer};
use opentelemetry::trace::{
    Span as _, SpanContext, SpanKind, Status, TraceContextExt, Tracer as _,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::TracerProvider;
use std::fmt;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Reports through OpenTelemetry.
///
/// Request spans are server spans, continuing the upstream trace when the
/// request carried a `traceparent` header. A panic report becomes an
/// `exception` event on a `panic` span whose parent is the request span, and
/// is mirrored as an `error` log event.
#[derive(Clone)]
pub struct OtelReporter {
    tracer: Arc<BoxedTracer>,
    provider: Option<TracerProvider>,
    defaults: Defaults,
}

impl OtelReporter {
    /// Creates a reporter.
    ///
    /// Spans come from `provider` when one is given, and from the global
    /// tracer otherwise. `provider` is force-flushed after a panic report.
    /// Without one, flushing succeeds immediately.
    #[must_use]
    pub fn new(provider: Option<TracerProvider>) -> Self {
        let tracer = match &provider {
            Some(provider) => BoxedTracer::new(Box::new(provider.tracer(TRACER_NAME))),
            None => tracer(),
        };
        Self {
            tracer: Arc::new(tracer),
            provider,
            defaults: Defaults::default(),
        }
    }

    /// Sets the level of the process-wide default scope.
    pub fn set_default_level(&self, level: Level) {
        self.defaults.set_level(level);
    }

    /// Sets a tag on the process-wide default scope.
    pub fn set_default_tag(&self, key: &str, value: &str) {
        self.defaults.set_tag(key, value);
    }
}

impl fmt::Debug for OtelReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelReporter")
            .field("provider", &self.provider.is_some())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Reporter for OtelReporter {
    type Scope = OtelScope;
    type Span = OtelSpan;

    fn fork_scope(&self) -> OtelScope {
        OtelScope {
            tracer: self.tracer.clone(),
            provider: self.provider.clone(),
            template: self.defaults.fork(),
            parent: None,
            root: None,
            method: None,
            path: None,
        }
    }

    fn start_span(&self, name: &str, options: SpanOptions) -> OtelSpan {
        let parent = options
            .parent
            .as_ref()
            .map_or_else(Context::new, remote_context);

        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new("op", options.op),
                KeyValue::new("transaction.source", options.source.as_str()),
            ])
            .start_with_context(self.tracer.as_ref(), &parent);

        OtelSpan {
            span,
            finished: false,
        }
    }

    fn bind_span(&self, scope: &mut OtelScope, span: &OtelSpan) {
        let context = span.span.span_context();
        if context.is_valid() {
            scope.root = Some(context.clone());
        }
    }
}

/// Request-local scope of an [`OtelReporter`].
pub struct OtelScope {
    tracer: Arc<BoxedTracer>,
    provider: Option<TracerProvider>,
    template: ScopeTemplate,
    parent: Option<TraceContext>,
    root: Option<SpanContext>,
    method: Option<String>,
    path: Option<String>,
}

impl OtelScope {
    /// Returns the scope's level.
    #[must_use]
    pub fn level(&self) -> Level {
        self.template.level
    }

    /// Sets a tag recorded on reports from this scope.
    pub fn set_tag(&mut self, key: &str, value: &str) {
        self.template
            .tags
            .insert(key.to_string(), value.to_string());
    }
}

impl fmt::Debug for OtelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelScope")
            .field("template", &self.template)
            .field("parent", &self.parent)
            .field("root", &self.root)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Scope for OtelScope {
    fn set_request(&mut self, request: &Request) {
        self.parent = TraceContext::from_request(request);
        self.method = Some(request.method().to_string());
        self.path = Some(request.uri().path().to_string());
    }

    fn set_level(&mut self, level: Level) {
        self.template.level = level;
    }

    fn recover(&mut self, request: &Request, error: &Error) -> Option<EventId> {
        let id = EventId::new();
        let message = error.to_string();
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| request.uri().path().to_string());
        let method = self
            .method
            .clone()
            .unwrap_or_else(|| request.method().to_string());

        let parent = match (&self.root, &self.parent) {
            (Some(root), _) => Context::new().with_remote_span_context(root.clone()),
            (None, Some(upstream)) => remote_context(upstream),
            (None, None) => Context::new(),
        };

        let mut attributes = vec![
            KeyValue::new("exception.type", "panic"),
            KeyValue::new("exception.message", message.clone()),
            KeyValue::new("event.id", id.to_string()),
            KeyValue::new("level", self.template.level.as_str()),
            KeyValue::new("http.method", method.clone()),
            KeyValue::new("http.path", path.clone()),
        ];
        attributes.extend(
            self.template
                .tags
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        );

        let mut span = self
            .tracer
            .span_builder("panic")
            .with_kind(SpanKind::Internal)
            .start_with_context(self.tracer.as_ref(), &parent);
        span.add_event("exception", attributes);
        span.set_status(Status::error(message.clone()));
        span.end();

        tracing::error!(
            event_id = %id,
            level = %self.template.level,
            http.method = %method,
            http.path = %path,
            error = %message,
            "panic recovered"
        );
        Some(id)
    }

    fn flush(&self, timeout: Duration) -> bool {
        let Some(provider) = self.provider.clone() else {
            return true;
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let flushed = provider.force_flush().into_iter().all(|result| result.is_ok());
            let _ = tx.send(flushed);
        });
        rx.recv_timeout(timeout).unwrap_or(false)
    }
}

/// Request span of an [`OtelReporter`].
pub struct OtelSpan {
    span: BoxedSpan,
    finished: bool,
}

impl OtelSpan {
    /// Returns the underlying OpenTelemetry span.
    ///
    /// Its span context can parent spans started by a step.
    #[must_use]
    pub fn inner(&self) -> &BoxedSpan {
        &self.span
    }
}

impl fmt::Debug for OtelSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelSpan")
            .field("span_context", self.span.span_context())
            .field("finished", &self.finished)
            .finish()
    }
}

impl Span for OtelSpan {
    fn set_status(&mut self, status: SpanStatus) {
        self.span.set_attribute(KeyValue::new("status", status.as_str()));
        if status.is_error() {
            self.span.set_status(Status::error(status.as_str()));
        } else {
            self.span.set_status(Status::Ok);
        }
    }

    fn set_tag(&mut self, key: &str, value: &str) {
        self.span
            .set_attribute(KeyValue::new(key.to_string(), value.to_string()));
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.span.end();
        }
    }
}
