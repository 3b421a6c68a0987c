//! Capability interface for error-reporting and tracing backends.
//!
//! The observability-wrapped executor never talks to a concrete backend. It
//! needs exactly three things:
//!
//! - a [`Reporter`] that forks a request-local [`Scope`] from the process
//!   default and starts root [`Span`]s,
//! - a [`Scope`] that can be bound to a request, raised to a severity, asked
//!   to report an error and flushed,
//! - a [`Span`] that can carry a status and tags and be finished.
//!
//! Any backend implementing these traits can be plugged in. The workspace
//! ships a `tracing` backend and an OpenTelemetry backend in
//! `middle-telemetry`, and a recording backend in
//! [`fixtures`](crate::fixtures) for tests.

use crate::error::Error;
use crate::exchange::Request;
use http::StatusCode;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// The W3C Trace Context header carrying the parent span.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Operation name given to every root span.
pub const SERVER_OP: &str = "http.server";

/// Span tag set when the request ended in a panic.
pub const PANIC_TAG: (&str, &str) = ("kind", "panic");

/// Severity of a reporting scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    /// Debugging information.
    Debug,
    /// Informational.
    #[default]
    Info,
    /// Something unexpected, but recoverable.
    Warning,
    /// An error.
    Error,
    /// An unrecoverable failure such as a panic.
    Fatal,
}

impl Level {
    /// Returns the lowercase name of the level.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanStatus {
    /// The request succeeded.
    Ok,
    /// The request was malformed (400).
    InvalidArgument,
    /// The caller is not authenticated (401).
    Unauthenticated,
    /// The caller is not allowed (403).
    PermissionDenied,
    /// The resource does not exist (404).
    NotFound,
    /// The resource already exists (409).
    AlreadyExists,
    /// Too many requests (429).
    ResourceExhausted,
    /// The client closed the request (499).
    Cancelled,
    /// The server failed (500, and any panic).
    InternalError,
    /// The operation is not implemented (501).
    Unimplemented,
    /// The service is unavailable (503).
    Unavailable,
    /// The operation timed out (504).
    DeadlineExceeded,
    /// Any other 4xx or 5xx status.
    UnknownError,
}

impl SpanStatus {
    /// Maps an HTTP status code to a span status.
    #[must_use]
    pub fn from_http(status: StatusCode) -> Self {
        match status.as_u16() {
            100..=399 => Self::Ok,
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            500 => Self::InternalError,
            501 => Self::Unimplemented,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            _ => Self::UnknownError,
        }
    }

    /// Returns true for any status other than [`SpanStatus::Ok`].
    #[must_use]
    pub fn is_error(self) -> bool {
        self != Self::Ok
    }

    /// Returns the snake_case name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal_error",
            Self::Unimplemented => "unimplemented",
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a report accepted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a new time-ordered identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Where a span's transaction name comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionSource {
    /// The raw request URL path.
    #[default]
    Url,
    /// A parameterized route template.
    Route,
    /// A name chosen by the application.
    Custom,
}

impl TransactionSource {
    /// Returns the lowercase name of the source.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Route => "route",
            Self::Custom => "custom",
        }
    }
}

/// Options for starting a root span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanOptions {
    /// Operation name, `http.server` for request spans.
    pub op: &'static str,
    /// Where the span name comes from.
    pub source: TransactionSource,
    /// Upstream trace to continue, if the request carried one.
    pub parent: Option<TraceContext>,
}

impl SpanOptions {
    /// Options for the root span of `request`.
    ///
    /// Continues the upstream trace when the request carries a valid
    /// `traceparent` header.
    #[must_use]
    pub fn for_request(request: &Request) -> Self {
        Self {
            op: SERVER_OP,
            source: TransactionSource::Url,
            parent: TraceContext::from_request(request),
        }
    }
}

impl Default for SpanOptions {
    fn default() -> Self {
        Self {
            op: SERVER_OP,
            source: TransactionSource::Url,
            parent: None,
        }
    }
}

/// Parsed W3C trace context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// The 128-bit trace ID as a lowercase hex string.
    pub trace_id: String,
    /// The parent span ID as a lowercase hex string.
    pub parent_span_id: String,
    /// Trace flags.
    pub flags: TraceFlags,
}

impl TraceContext {
    /// Parses a `traceparent` header value.
    ///
    /// Format: `{version}-{trace-id}-{parent-span-id}-{flags}`, for example
    /// `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`.
    ///
    /// All-zero trace or span IDs are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let (version, trace_id, span_id, flags) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != "00" {
            return None;
        }

        if !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
            return None;
        }
        if trace_id.bytes().all(|b| b == b'0') || span_id.bytes().all(|b| b == b'0') {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_span_id: span_id.to_ascii_lowercase(),
            flags: TraceFlags(flags),
        })
    }

    /// Extracts the trace context from the request's `traceparent` header.
    pub fn from_request(request: &Request) -> Option<Self> {
        let value = request.headers().get(TRACEPARENT_HEADER)?.to_str().ok()?;
        Self::parse(value)
    }
}

fn is_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Trace flags from the W3C Trace Context header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceFlags(pub u8);

impl TraceFlags {
    /// No flags set.
    pub const NONE: Self = Self(0x00);
    /// The trace is sampled.
    pub const SAMPLED: Self = Self(0x01);

    /// Returns true if the sampled flag is set.
    #[must_use]
    pub const fn is_sampled(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// A tracing and error-reporting backend.
pub trait Reporter: Send + Sync + 'static {
    /// Request-local reporting state.
    type Scope: Scope;

    /// A timed span.
    type Span: Span;

    /// Clones the process-wide default scope into a request-local one.
    ///
    /// The default itself is never modified through the returned scope.
    fn fork_scope(&self) -> Self::Scope;

    /// Starts a root span.
    fn start_span(&self, name: &str, options: SpanOptions) -> Self::Span;

    /// Links a request-local scope to the request's root span, so reports
    /// made through the scope land in the span's trace.
    ///
    /// Called once per request, right after the root span is started.
    fn bind_span(&self, _scope: &mut Self::Scope, _span: &Self::Span) {}
}

/// Request-local reporting state.
pub trait Scope {
    /// Associates the request with everything reported through this scope.
    fn set_request(&mut self, request: &Request);

    /// Sets the severity of subsequent reports.
    fn set_level(&mut self, level: Level);

    /// Reports an error recovered from a panic.
    ///
    /// Returns the event identifier if the backend accepted the report.
    fn recover(&mut self, request: &Request, error: &Error) -> Option<EventId>;

    /// Waits up to `timeout` for pending reports to be delivered.
    ///
    /// Returns false if the timeout elapsed first.
    fn flush(&self, timeout: Duration) -> bool;
}

/// A timed span.
pub trait Span {
    /// Records the outcome of the span.
    fn set_status(&mut self, status: SpanStatus);

    /// Attaches a tag.
    fn set_tag(&mut self, key: &str, value: &str);

    /// Ends the span. Calls after the first have no effect.
    fn finish(&mut self);
}

/// Owns a span and finishes it exactly once.
///
/// The span is finished when the guard is dropped, including while
/// unwinding, unless [`SpanGuard::finish`] was called first.
#[derive(Debug)]
pub struct SpanGuard<S: Span> {
    span: S,
    finished: bool,
}

impl<S: Span> SpanGuard<S> {
    /// Takes ownership of `span`.
    pub fn new(span: S) -> Self {
        Self {
            span,
            finished: false,
        }
    }

    /// Returns the span.
    pub fn span(&self) -> &S {
        &self.span
    }

    /// Returns the span for modification.
    pub fn span_mut(&mut self) -> &mut S {
        &mut self.span
    }

    /// Finishes the span now.
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.span.finish();
        }
    }
}

impl<S: Span> Drop for SpanGuard<S> {
    fn drop(&mut self) {
        self.close();
    }
}
