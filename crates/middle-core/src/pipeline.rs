//! Chain execution.
//!
//! A [`Pipeline`] is a finished chain: its non-terminal steps plus the
//! terminal step. It is immutable once built and holds no per-request state,
//! so one pipeline can serve any number of concurrent requests.
//!
//! ## Dispatch
//!
//! | Event | Default dispatch | [`Finally`] |
//! |-------|------------------|-------------|
//! | step returns [`Abort`](crate::error::Abort) | stop silently | stop silently |
//! | step returns another error | stop silently | stop, call observer |
//! | all steps succeed | completed | completed |
//!
//! Panics are not contained here. The observability wrapper in
//! [`traced`](crate::traced) is the only place a panic is caught.

use crate::chain::{Halt, Steps};
use crate::error::{is_abort, Error, StepResult};
use crate::exchange::{Exchange, Request, Response};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// The generic request handler shape a host dispatches to.
///
/// Every composed pipeline implements this, so it can be registered with
/// whatever transport the host uses.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call(&self, request: Request) -> Response;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call(&self, request: Request) -> Response {
        (**self).call(request)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn call(&self, request: Request) -> Response {
        (**self).call(request)
    }
}

/// How one execution of a chain ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every step succeeded.
    Completed,

    /// A step returned [`Abort`](crate::error::Abort), possibly wrapped.
    Aborted {
        /// 1-based index of the step.
        step: usize,
    },

    /// A step returned any other error.
    Failed {
        /// 1-based index of the step.
        step: usize,
        /// The error the step returned.
        error: Error,
    },

    /// A step panicked and the panic was contained.
    Panicked {
        /// The error derived from the panic payload.
        error: Error,
    },
}

impl Outcome {
    /// Returns true if every step succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the chain was stopped by an abort.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Returns the step the chain stopped at, if a step returned an error.
    #[must_use]
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::Aborted { step } | Self::Failed { step, .. } => Some(*step),
            Self::Completed | Self::Panicked { .. } => None,
        }
    }

    /// Returns the error an observer would receive, if any.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed { error, .. } | Self::Panicked { error } => Some(error),
            Self::Completed | Self::Aborted { .. } => None,
        }
    }

    /// Emits a debug event describing the outcome.
    pub(crate) fn log(&self, path: &str) {
        match self {
            Self::Completed => debug!(path, "chain completed"),
            Self::Aborted { step } => debug!(path, step, "chain aborted"),
            Self::Failed { step, error } => {
                debug!(path, step, error = %error, "chain failed");
            }
            Self::Panicked { error } => debug!(path, error = %error, "chain panicked"),
        }
    }
}

/// A finished chain.
///
/// Built by [`Chain::handle`](crate::chain::Chain::handle) or the
/// [`chain!`](crate::chain!) macro.
pub struct Pipeline<Cx, S, F> {
    steps: S,
    terminal: F,
    _cx: PhantomData<fn(&mut Cx)>,
}

impl<Cx, S: fmt::Debug, F> fmt::Debug for Pipeline<Cx, S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl<Cx, S, F> Pipeline<Cx, S, F>
where
    S: Steps<Cx>,
    F: Fn(&mut Cx, &S::Output) -> StepResult<()> + Send + Sync + 'static,
{
    pub(crate) fn new(steps: S, terminal: F) -> Self {
        Self {
            steps,
            terminal,
            _cx: PhantomData,
        }
    }

    /// Returns the number of steps, including the terminal one.
    #[must_use]
    pub fn step_count(&self) -> usize {
        S::LEN + 1
    }

    /// Runs every step against `cx`, stopping at the first error.
    ///
    /// Steps run in ascending order on the calling thread. A step that fails
    /// ends the execution; no later step runs.
    pub fn execute(&self, cx: &mut Cx) -> Outcome {
        let result = self.steps.run(cx).and_then(|outputs| {
            (self.terminal)(cx, &outputs).map_err(|error| Halt {
                step: S::LEN + 1,
                error,
            })
        });

        match result {
            Ok(()) => Outcome::Completed,
            Err(Halt { step, error }) if is_abort(&error) => Outcome::Aborted { step },
            Err(Halt { step, error }) => Outcome::Failed { step, error },
        }
    }

    /// Wraps the pipeline with an observer for failures.
    ///
    /// The observer is called exactly once when any step fails with an error
    /// other than [`Abort`](crate::error::Abort). It is expected to write a
    /// failure response.
    #[must_use]
    pub fn finally<O>(self, observer: O) -> Finally<Cx, S, F, O>
    where
        O: Fn(&mut Cx, &Error) + Send + Sync + 'static,
    {
        Finally {
            pipeline: self,
            observer,
        }
    }
}

impl<S, F> Handler for Pipeline<Exchange, S, F>
where
    S: Steps<Exchange>,
    F: Fn(&mut Exchange, &S::Output) -> StepResult<()> + Send + Sync + 'static,
{
    /// Default dispatch: runs the chain and discards any error.
    fn call(&self, request: Request) -> Response {
        let mut exchange = Exchange::new(request);
        self.execute(&mut exchange).log(exchange.path());
        exchange.into_response()
    }
}

/// A pipeline whose failures are reported to an observer.
///
/// Built by [`Pipeline::finally`].
pub struct Finally<Cx, S, F, O> {
    pipeline: Pipeline<Cx, S, F>,
    observer: O,
}

impl<Cx, S: fmt::Debug, F, O> fmt::Debug for Finally<Cx, S, F, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finally")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl<Cx, S, F, O> Finally<Cx, S, F, O>
where
    S: Steps<Cx>,
    F: Fn(&mut Cx, &S::Output) -> StepResult<()> + Send + Sync + 'static,
    O: Fn(&mut Cx, &Error) + Send + Sync + 'static,
{
    /// Runs the chain, then hands a non-abort failure to the observer.
    pub fn execute(&self, cx: &mut Cx) -> Outcome {
        let outcome = self.pipeline.execute(cx);
        if let Outcome::Failed { error, .. } = &outcome {
            (self.observer)(cx, error);
        }
        outcome
    }

    /// Returns the wrapped pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline<Cx, S, F> {
        &self.pipeline
    }
}

impl<S, F, O> Handler for Finally<Exchange, S, F, O>
where
    S: Steps<Exchange>,
    F: Fn(&mut Exchange, &S::Output) -> StepResult<()> + Send + Sync + 'static,
    O: Fn(&mut Exchange, &Error) + Send + Sync + 'static,
{
    fn call(&self, request: Request) -> Response {
        let mut exchange = Exchange::new(request);
        self.execute(&mut exchange).log(exchange.path());
        exchange.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::error::Abort;
    use anyhow::{anyhow, Context};
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> Request {
        http::Request::builder()
            .uri("/orders")
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn test_single_step_completes() {
        let pipeline = Chain::<Exchange>::new().handle(|ex, ()| {
            ex.response_mut().write_str("ok");
            Ok(())
        });

        assert_eq!(pipeline.step_count(), 1);
        let mut exchange = Exchange::new(request());
        assert!(pipeline.execute(&mut exchange).is_completed());
        assert_eq!(exchange.response().body(), b"ok");
    }

    #[test]
    fn test_terminal_failure_reports_last_step() {
        let pipeline = Chain::<Exchange>::new()
            .then(|_, ()| Ok(1))
            .handle(|_, _| Err(anyhow!("terminal")));

        let outcome = pipeline.execute(&mut Exchange::new(request()));
        assert_eq!(outcome.step(), Some(2));
        assert_eq!(outcome.error().unwrap().to_string(), "terminal");
    }

    #[test]
    fn test_wrapped_abort_is_classified() {
        let pipeline = Chain::<Exchange>::new()
            .then(|_, ()| -> StepResult<u8> { Err(Abort).context("stop here") })
            .handle(|_, _| Ok(()));

        let outcome = pipeline.execute(&mut Exchange::new(request()));
        assert!(outcome.is_aborted());
        assert_eq!(outcome.step(), Some(1));
        assert!(outcome.error().is_none());
    }

    #[test]
    fn test_default_dispatch_discards_error() {
        let pipeline = Chain::<Exchange>::new().handle(|ex, ()| {
            ex.response_mut().set_status(StatusCode::ACCEPTED);
            Err(anyhow!("ignored"))
        });

        let response = pipeline.call(request());
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_finally_observes_failure() {
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();

        let handler = Chain::<Exchange>::new()
            .then(|_, ()| -> StepResult<()> { Err(anyhow!("lookup failed")) })
            .handle(|_, _| Ok(()))
            .finally(move |ex, error| {
                counter.fetch_add(1, Ordering::SeqCst);
                ex.response_mut()
                    .error(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string());
            });

        let response = handler.call(request());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finally_skips_abort() {
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();

        let handler = Chain::<Exchange>::new()
            .handle(|_, ()| Err(Abort.into()))
            .finally(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let outcome = handler.execute(&mut Exchange::new(request()));
        assert!(outcome.is_aborted());
        assert_eq!(observed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pipeline_is_shareable() {
        fn assert_handler<H: Handler>(_: &H) {}

        let pipeline = Arc::new(Chain::<Exchange>::new().handle(|_, ()| Ok(())));
        assert_handler(&pipeline);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || pipeline.call(request()).status())
            })
            .collect();

        for thread in threads {
            assert_eq!(thread.join().unwrap(), StatusCode::OK);
        }
    }
}
