//! Observability-wrapped execution.
//!
//! A chain whose context is [`Traced<R>`] runs with a request-local
//! reporting scope and a root span from the [`Reporter`] `R`. Wrapping the
//! finished pipeline with [`Pipeline::instrument`] produces a [`Handler`]
//! that, for every request:
//!
//! 1. forks the reporter's default scope,
//! 2. starts a root span named `"{METHOD} {path}"` and binds it to the scope,
//! 3. binds the request to the scope,
//! 4. runs every step inside a panic guard.
//!
//! The span is finished exactly once on every exit path.
//!
//! ## Panics
//!
//! A panic in any step is contained at the request boundary. The guard
//! marks the span `internal_error` with the tag `kind=panic`, raises the
//! scope to [`Level::Fatal`], reports the panic through the scope and, if
//! the backend accepted the report, flushes it with a bounded timeout.
//! Under [`InstrumentedFinally`] the observer then receives the panic error,
//! even when the payload wraps [`Abort`](crate::error::Abort).
//!
//! # Example
//!
//! ```
//! use middle_core::chain::Chain;
//! use middle_core::fixtures::RecordingReporter;
//! use middle_core::observe::Span;
//! use middle_core::pipeline::Handler;
//! use middle_core::traced::Traced;
//!
//! let reporter = RecordingReporter::new();
//! let handler = Chain::<Traced<RecordingReporter>>::new()
//!     .then(|cx, ()| Ok(cx.path().to_string()))
//!     .handle(|cx, (path,)| {
//!         cx.span_mut().set_tag("route", path);
//!         Ok(())
//!     })
//!     .instrument(reporter.clone());
//!
//! let request = http::Request::get("/users").body(bytes::Bytes::new()).unwrap();
//! let response = handler.call(request);
//! assert_eq!(response.status(), 200);
//! assert_eq!(reporter.spans().len(), 1);
//! ```

use crate::chain::Steps;
use crate::error::{panic_error, Error, StepResult};
use crate::exchange::{Exchange, Request, Response};
use crate::observe::{Level, Reporter, Scope, Span, SpanGuard, SpanOptions, SpanStatus, PANIC_TAG};
use crate::pipeline::{Handler, Outcome, Pipeline};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, warn};

/// Default upper bound on the post-panic flush.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Context for one request of an observability-wrapped chain.
///
/// Dereferences to the underlying [`Exchange`], so steps read the request
/// and write the response the same way plain steps do.
pub struct Traced<R: Reporter> {
    exchange: Exchange,
    scope: R::Scope,
    span: SpanGuard<R::Span>,
}

impl<R: Reporter> Traced<R> {
    /// Returns the request-local reporting scope.
    pub fn scope(&self) -> &R::Scope {
        &self.scope
    }

    /// Returns the request-local reporting scope for modification.
    pub fn scope_mut(&mut self) -> &mut R::Scope {
        &mut self.scope
    }

    /// Returns the root span of the request.
    ///
    /// Steps may start child spans from it. Their lifecycle is the step's
    /// concern.
    pub fn span(&self) -> &R::Span {
        self.span.span()
    }

    /// Returns the root span for modification.
    pub fn span_mut(&mut self) -> &mut R::Span {
        self.span.span_mut()
    }

    /// Returns the exchange.
    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// Returns the exchange for modification.
    pub fn exchange_mut(&mut self) -> &mut Exchange {
        &mut self.exchange
    }

    fn begin(reporter: &R, request: Request) -> Self {
        let mut scope = reporter.fork_scope();
        let name = format!("{} {}", request.method(), request.uri().path());
        let span = reporter.start_span(&name, SpanOptions::for_request(&request));
        reporter.bind_span(&mut scope, &span);
        scope.set_request(&request);

        Self {
            exchange: Exchange::new(request),
            scope,
            span: SpanGuard::new(span),
        }
    }

    /// Runs the panic guard for a contained panic.
    fn contain(&mut self, error: &Error, flush_timeout: Duration) {
        let span = self.span.span_mut();
        span.set_status(SpanStatus::InternalError);
        span.set_tag(PANIC_TAG.0, PANIC_TAG.1);

        self.scope.set_level(Level::Fatal);
        let event = self.scope.recover(self.exchange.request(), error);

        warn!(
            path = self.exchange.path(),
            error = %error,
            event_id = ?event,
            "panic contained"
        );

        if event.is_some() && !self.scope.flush(flush_timeout) {
            warn!(timeout = ?flush_timeout, "report flush timed out");
        }
    }

    fn finish(self) -> Response {
        let Self {
            exchange,
            scope: _,
            span,
        } = self;
        span.finish();
        exchange.into_response()
    }
}

impl<R: Reporter> Deref for Traced<R> {
    type Target = Exchange;

    fn deref(&self) -> &Exchange {
        &self.exchange
    }
}

impl<R: Reporter> DerefMut for Traced<R> {
    fn deref_mut(&mut self) -> &mut Exchange {
        &mut self.exchange
    }
}

impl<R: Reporter> fmt::Debug for Traced<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traced")
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

impl<R, S, F> Pipeline<Traced<R>, S, F>
where
    R: Reporter,
    S: Steps<Traced<R>>,
    F: Fn(&mut Traced<R>, &S::Output) -> StepResult<()> + Send + Sync + 'static,
{
    /// Wraps the pipeline with scope and span lifecycle and panic
    /// containment, using `reporter` as the backend.
    #[must_use]
    pub fn instrument(self, reporter: R) -> Instrumented<R, S, F> {
        Instrumented {
            pipeline: self,
            reporter,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

/// An observability-wrapped pipeline with default dispatch.
///
/// Built by [`Pipeline::instrument`].
pub struct Instrumented<R, S, F>
where
    R: Reporter,
{
    pipeline: Pipeline<Traced<R>, S, F>,
    reporter: R,
    flush_timeout: Duration,
}

impl<R, S, F> Instrumented<R, S, F>
where
    R: Reporter,
    S: Steps<Traced<R>>,
    F: Fn(&mut Traced<R>, &S::Output) -> StepResult<()> + Send + Sync + 'static,
{
    /// Sets the upper bound on the flush that follows a reported panic.
    #[must_use]
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Returns the flush timeout.
    #[must_use]
    pub fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    /// Returns the backend.
    #[must_use]
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Wraps the pipeline with an observer for failures and panics.
    #[must_use]
    pub fn finally<O>(self, observer: O) -> InstrumentedFinally<R, S, F, O>
    where
        O: Fn(&mut Traced<R>, &Error) + Send + Sync + 'static,
    {
        InstrumentedFinally {
            inner: self,
            observer,
        }
    }

    /// Runs the chain for one request, handing failures to `observe`.
    fn dispatch<O>(&self, request: Request, observe: &O) -> Response
    where
        O: Fn(&mut Traced<R>, &Error),
    {
        let mut traced = Traced::begin(&self.reporter, request);

        let guarded = panic::catch_unwind(AssertUnwindSafe(|| {
            let outcome = self.pipeline.execute(&mut traced);
            if let Outcome::Failed { error, .. } = &outcome {
                observe(&mut traced, error);
            }
            outcome
        }));

        let outcome = match guarded {
            Ok(outcome) => {
                let status = SpanStatus::from_http(traced.response().status());
                traced.span_mut().set_status(status);
                outcome
            }
            Err(payload) => {
                let error = panic_error(payload);
                traced.contain(&error, self.flush_timeout);
                observe(&mut traced, &error);
                Outcome::Panicked { error }
            }
        };

        outcome.log(traced.path());
        traced.finish()
    }
}

impl<R, S, F> Handler for Instrumented<R, S, F>
where
    R: Reporter,
    S: Steps<Traced<R>>,
    F: Fn(&mut Traced<R>, &S::Output) -> StepResult<()> + Send + Sync + 'static,
{
    fn call(&self, request: Request) -> Response {
        self.dispatch(request, &|_: &mut Traced<R>, error: &Error| {
            debug!(error = %error, "error discarded");
        })
    }
}

impl<R, S, F> fmt::Debug for Instrumented<R, S, F>
where
    R: Reporter + fmt::Debug,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumented")
            .field("pipeline", &self.pipeline)
            .field("reporter", &self.reporter)
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}

/// An observability-wrapped pipeline whose failures and panics are reported
/// to an observer.
///
/// Built by [`Instrumented::finally`].
pub struct InstrumentedFinally<R, S, F, O>
where
    R: Reporter,
{
    inner: Instrumented<R, S, F>,
    observer: O,
}

impl<R, S, F, O> InstrumentedFinally<R, S, F, O>
where
    R: Reporter,
    S: Steps<Traced<R>>,
    F: Fn(&mut Traced<R>, &S::Output) -> StepResult<()> + Send + Sync + 'static,
    O: Fn(&mut Traced<R>, &Error) + Send + Sync + 'static,
{
    /// Sets the upper bound on the flush that follows a reported panic.
    #[must_use]
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.inner.flush_timeout = timeout;
        self
    }

    /// Returns the backend.
    #[must_use]
    pub fn reporter(&self) -> &R {
        &self.inner.reporter
    }
}

impl<R, S, F, O> Handler for InstrumentedFinally<R, S, F, O>
where
    R: Reporter,
    S: Steps<Traced<R>>,
    F: Fn(&mut Traced<R>, &S::Output) -> StepResult<()> + Send + Sync + 'static,
    O: Fn(&mut Traced<R>, &Error) + Send + Sync + 'static,
{
    fn call(&self, request: Request) -> Response {
        self.inner.dispatch(request, &self.observer)
    }
}

impl<R, S, F, O> fmt::Debug for InstrumentedFinally<R, S, F, O>
where
    R: Reporter + fmt::Debug,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedFinally")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::error::Abort;
    use crate::fixtures::{Call, RecordingReporter};
    use anyhow::anyhow;
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Cx = Traced<RecordingReporter>;

    fn request() -> Request {
        http::Request::builder()
            .method("POST")
            .uri("/orders/7")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn test_span_named_from_request() {
        let reporter = RecordingReporter::new();
        let handler = Chain::<Cx>::new()
            .handle(|_, ()| Ok(()))
            .instrument(reporter.clone());

        handler.call(request());

        let spans = reporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "POST /orders/7");
        assert_eq!(spans[0].op, "http.server");
        assert_eq!(spans[0].status, Some(SpanStatus::Ok));
        assert_eq!(spans[0].finished, 1);
    }

    #[test]
    fn test_scope_forked_and_bound_before_steps() {
        let reporter = RecordingReporter::new();
        let journal = reporter.clone();
        let handler = Chain::<Cx>::new()
            .handle(move |_, ()| {
                let calls = journal.calls();
                assert!(matches!(calls[0], Call::ForkScope));
                assert!(matches!(calls[1], Call::StartSpan { .. }));
                assert!(matches!(calls[2], Call::SetRequest { .. }));
                Ok(())
            })
            .instrument(reporter.clone());

        assert_eq!(handler.call(request()).status(), StatusCode::OK);
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn test_span_status_follows_response() {
        let reporter = RecordingReporter::new();
        let handler = Chain::<Cx>::new()
            .handle(|cx, ()| {
                cx.response_mut().set_status(StatusCode::NOT_FOUND);
                Ok(())
            })
            .instrument(reporter.clone());

        handler.call(request());
        assert_eq!(reporter.spans()[0].status, Some(SpanStatus::NotFound));
    }

    #[test]
    fn test_panic_is_contained_and_reported() {
        let reporter = RecordingReporter::new();
        let handler = Chain::<Cx>::new()
            .then(|_, ()| -> StepResult<u8> { panic!("ledger corrupted") })
            .handle(|_, _| Ok(()))
            .instrument(reporter.clone());

        let response = handler.call(request());
        assert_eq!(response.status(), StatusCode::OK);

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message, "panic: ledger corrupted");
        assert_eq!(reports[0].level, Level::Fatal);
        assert_eq!(reports[0].path, "/orders/7");

        let span = &reporter.spans()[0];
        assert_eq!(span.status, Some(SpanStatus::InternalError));
        assert_eq!(span.tags.get("kind").map(String::as_str), Some("panic"));
        assert_eq!(span.finished, 1);
        assert_eq!(reporter.flushes(), vec![DEFAULT_FLUSH_TIMEOUT]);
    }

    #[test]
    fn test_no_flush_without_event() {
        let reporter = RecordingReporter::rejecting();
        let handler = Chain::<Cx>::new()
            .handle(|_, ()| panic!("dropped"))
            .instrument(reporter.clone())
            .with_flush_timeout(Duration::from_millis(50));

        handler.call(request());
        assert_eq!(reporter.reports().len(), 1);
        assert!(reporter.flushes().is_empty());
    }

    #[test]
    fn test_finally_receives_errors_and_panics() {
        let reporter = RecordingReporter::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handler = Chain::<Cx>::new()
            .then(|cx, ()| {
                if cx.path() == "/panic" {
                    panic!("step exploded");
                }
                Ok(())
            })
            .handle(|_, _| Err(anyhow!("terminal failed")))
            .instrument(reporter.clone())
            .finally(move |cx, error| {
                sink.lock().push(error.to_string());
                cx.response_mut()
                    .error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
            });

        let failed = handler.call(request());
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let panicked = handler.call(
            http::Request::get("/panic").body(Bytes::new()).unwrap(),
        );
        assert_eq!(panicked.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            *seen.lock(),
            vec!["terminal failed".to_string(), "panic: step exploded".to_string()]
        );
        // Returned errors are not reported to the backend, only panics.
        assert_eq!(reporter.reports().len(), 1);
        assert_eq!(reporter.spans()[0].status, Some(SpanStatus::InternalError));
    }

    #[test]
    fn test_abort_skips_observer() {
        let reporter = RecordingReporter::new();
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();

        let handler = Chain::<Cx>::new()
            .handle(|_, ()| Err(Abort.into()))
            .instrument(reporter.clone())
            .finally(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        handler.call(request());
        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(reporter.spans()[0].finished, 1);
    }

    #[test]
    fn test_abort_panic_reaches_observer() {
        let reporter = RecordingReporter::new();
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();

        let handler = Chain::<Cx>::new()
            .handle(|_, ()| std::panic::panic_any(Error::from(Abort)))
            .instrument(reporter.clone())
            .finally(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        handler.call(request());
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scopes_are_request_local() {
        let reporter = RecordingReporter::new();
        let handler = Chain::<Cx>::new()
            .handle(|cx, ()| {
                cx.scope_mut().set_level(Level::Warning);
                Ok(())
            })
            .instrument(reporter.clone());

        handler.call(request());
        handler.call(request());

        assert_eq!(reporter.default_level(), Level::Info);
        assert_eq!(reporter.spans().len(), 2);
    }
}
