//! A recording backend for tests.
//!
//! [`RecordingReporter`] implements [`Reporter`] without delivering
//! anything. Every scope and span call is appended to a journal shared by
//! all clones of the reporter, so a test can hand one clone to a pipeline
//! and inspect the other afterwards.
//!
//! # Example
//!
//! ```
//! use middle_core::fixtures::RecordingReporter;
//! use middle_core::observe::{Reporter, Span, SpanOptions, SpanStatus};
//!
//! let reporter = RecordingReporter::new();
//! let mut span = reporter.start_span("GET /", SpanOptions::default());
//! span.set_status(SpanStatus::Ok);
//! span.finish();
//!
//! let spans = reporter.spans();
//! assert_eq!(spans[0].name, "GET /");
//! assert_eq!(spans[0].finished, 1);
//! ```

use crate::error::Error;
use crate::exchange::Request;
use crate::observe::{EventId, Level, Reporter, Scope, Span, SpanOptions, SpanStatus, TraceContext};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One call made against the recording backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// [`Reporter::fork_scope`].
    ForkScope,
    /// [`Reporter::start_span`].
    StartSpan {
        /// The span name.
        name: String,
    },
    /// [`Scope::set_request`].
    SetRequest {
        /// The request path.
        path: String,
    },
    /// [`Scope::set_level`].
    SetLevel(Level),
    /// [`Scope::recover`].
    Recover {
        /// The reported error message.
        message: String,
    },
    /// [`Scope::flush`].
    Flush(Duration),
    /// [`Span::set_status`].
    SetStatus(SpanStatus),
    /// [`Span::set_tag`].
    SetTag {
        /// Tag key.
        key: String,
        /// Tag value.
        value: String,
    },
    /// [`Span::finish`].
    Finish,
}

/// A span as seen by the recording backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRecord {
    /// The span name.
    pub name: String,
    /// The operation name.
    pub op: &'static str,
    /// The continued upstream trace, if any.
    pub parent: Option<TraceContext>,
    /// The last status set.
    pub status: Option<SpanStatus>,
    /// Tags set on the span.
    pub tags: BTreeMap<String, String>,
    /// Number of times `finish` was called.
    pub finished: usize,
}

/// A report received through [`Scope::recover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Identifier returned to the caller, if the report was accepted.
    pub id: Option<EventId>,
    /// The error message.
    pub message: String,
    /// The scope's level at the time of the report.
    pub level: Level,
    /// Path of the request bound to the scope.
    pub path: String,
}

#[derive(Debug, Default)]
struct Journal {
    calls: Vec<Call>,
    spans: Vec<SpanRecord>,
    reports: Vec<Report>,
    flushes: Vec<Duration>,
}

#[derive(Debug)]
struct Shared {
    journal: Mutex<Journal>,
    default_level: RwLock<Level>,
    accept_reports: bool,
}

impl Shared {
    fn record(&self, call: Call) {
        self.journal.lock().calls.push(call);
    }
}

/// A [`Reporter`] that records every call.
#[derive(Debug, Clone)]
pub struct RecordingReporter {
    shared: Arc<Shared>,
}

impl RecordingReporter {
    /// Creates a reporter that accepts every report.
    #[must_use]
    pub fn new() -> Self {
        Self::with_acceptance(true)
    }

    /// Creates a reporter whose scopes record reports but return no event
    /// identifier, as a backend that drops events would.
    #[must_use]
    pub fn rejecting() -> Self {
        Self::with_acceptance(false)
    }

    fn with_acceptance(accept_reports: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                journal: Mutex::new(Journal::default()),
                default_level: RwLock::new(Level::default()),
                accept_reports,
            }),
        }
    }

    /// Sets the level of the process-wide default scope.
    pub fn set_default_level(&self, level: Level) {
        *self.shared.default_level.write() = level;
    }

    /// Returns the level of the process-wide default scope.
    #[must_use]
    pub fn default_level(&self) -> Level {
        *self.shared.default_level.read()
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.shared.journal.lock().calls.clone()
    }

    /// Returns every span started so far.
    #[must_use]
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.shared.journal.lock().spans.clone()
    }

    /// Returns every report received so far.
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.shared.journal.lock().reports.clone()
    }

    /// Returns the timeout of every flush so far.
    #[must_use]
    pub fn flushes(&self) -> Vec<Duration> {
        self.shared.journal.lock().flushes.clone()
    }
}

impl Default for RecordingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for RecordingReporter {
    type Scope = RecordingScope;
    type Span = RecordingSpan;

    fn fork_scope(&self) -> RecordingScope {
        self.shared.record(Call::ForkScope);
        RecordingScope {
            shared: self.shared.clone(),
            level: self.default_level(),
            path: None,
        }
    }

    fn start_span(&self, name: &str, options: SpanOptions) -> RecordingSpan {
        let mut journal = self.shared.journal.lock();
        journal.calls.push(Call::StartSpan {
            name: name.to_string(),
        });
        journal.spans.push(SpanRecord {
            name: name.to_string(),
            op: options.op,
            parent: options.parent,
            status: None,
            tags: BTreeMap::new(),
            finished: 0,
        });

        RecordingSpan {
            shared: self.shared.clone(),
            index: journal.spans.len() - 1,
        }
    }
}

/// Request-local scope of a [`RecordingReporter`].
#[derive(Debug)]
pub struct RecordingScope {
    shared: Arc<Shared>,
    level: Level,
    path: Option<String>,
}

impl RecordingScope {
    /// Returns the scope's current level.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }
}

impl Scope for RecordingScope {
    fn set_request(&mut self, request: &Request) {
        let path = request.uri().path().to_string();
        self.shared.record(Call::SetRequest { path: path.clone() });
        self.path = Some(path);
    }

    fn set_level(&mut self, level: Level) {
        self.shared.record(Call::SetLevel(level));
        self.level = level;
    }

    fn recover(&mut self, request: &Request, error: &Error) -> Option<EventId> {
        let id = self.shared.accept_reports.then(EventId::new);
        let message = error.to_string();

        let mut journal = self.shared.journal.lock();
        journal.calls.push(Call::Recover {
            message: message.clone(),
        });
        journal.reports.push(Report {
            id,
            message,
            level: self.level,
            path: self
                .path
                .clone()
                .unwrap_or_else(|| request.uri().path().to_string()),
        });
        id
    }

    fn flush(&self, timeout: Duration) -> bool {
        let mut journal = self.shared.journal.lock();
        journal.calls.push(Call::Flush(timeout));
        journal.flushes.push(timeout);
        true
    }
}

/// Span of a [`RecordingReporter`].
#[derive(Debug)]
pub struct RecordingSpan {
    shared: Arc<Shared>,
    index: usize,
}

impl RecordingSpan {
    fn update(&self, call: Call, apply: impl FnOnce(&mut SpanRecord)) {
        let mut journal = self.shared.journal.lock();
        journal.calls.push(call);
        if let Some(record) = journal.spans.get_mut(self.index) {
            apply(record);
        }
    }
}

impl Span for RecordingSpan {
    fn set_status(&mut self, status: SpanStatus) {
        self.update(Call::SetStatus(status), |record| {
            record.status = Some(status);
        });
    }

    fn set_tag(&mut self, key: &str, value: &str) {
        let call = Call::SetTag {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.update(call, |record| {
            record.tags.insert(key.to_string(), value.to_string());
        });
    }

    fn finish(&mut self) {
        self.update(Call::Finish, |record| record.finished += 1);
    }
}
