//! Error types for step chains.
//!
//! Step functions return [`Error`], an alias for [`anyhow::Error`], so any
//! error type can be propagated out of a step with `?`. Two errors carry
//! special meaning for the executor:
//!
//! - [`Abort`] stops a chain without being reported to a `finally` observer.
//!   It is recognized anywhere in an error's source chain, so wrapping it with
//!   [`anyhow::Context`] or a custom error type keeps its meaning.
//! - [`PanicError`] is what a contained panic turns into before it is
//!   reported to the telemetry backend and the observer.
//!
//! # Example
//!
//! ```
//! use anyhow::Context;
//! use middle_core::error::{is_abort, Abort, Error};
//!
//! let plain: Error = Abort.into();
//! assert!(is_abort(&plain));
//!
//! let wrapped = Err::<(), _>(Abort).context("client went away").unwrap_err();
//! assert!(is_abort(&wrapped));
//!
//! let other = anyhow::anyhow!("database unavailable");
//! assert!(!is_abort(&other));
//! ```

use std::any::Any;
use thiserror::Error;

/// The error type returned by step functions.
pub type Error = anyhow::Error;

/// Result type alias for step functions.
pub type StepResult<T> = Result<T, Error>;

/// Sentinel error that stops a chain silently.
///
/// Returning `Abort` (or any error wrapping it) from a step halts the chain
/// exactly like any other error, but the `finally` observer is not invoked.
/// Use it when a step has already written a complete response and the rest
/// of the chain must not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("chain execution stopped")]
pub struct Abort;

/// Returns true if `error` is [`Abort`] or wraps it at any depth.
#[must_use]
pub fn is_abort(error: &Error) -> bool {
    error.chain().any(|cause| cause.is::<Abort>())
}

/// An error produced from a panic payload.
///
/// Panic payloads are `Box<dyn Any + Send>`. The conversion in
/// [`panic_error`] keeps as much of the payload as the type system allows.
#[derive(Debug, Error)]
pub enum PanicError {
    /// The payload was a boxed standard error.
    #[error(transparent)]
    Error(Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The payload was text (`&'static str` or `String`).
    #[error("panic: {0}")]
    Message(String),

    /// The payload was neither an error nor text.
    #[error("panic: non-string payload")]
    Opaque,
}

/// Converts a caught panic payload into a reportable [`Error`].
///
/// - an [`anyhow::Error`] payload (from `std::panic::panic_any`) is used
///   directly
/// - a boxed `std::error::Error` is wrapped transparently
/// - `&str` and `String` payloads are wrapped as a message
/// - anything else becomes [`PanicError::Opaque`], since a `dyn Any`
///   payload has no rendering of its own
#[must_use]
pub fn panic_error(payload: Box<dyn Any + Send>) -> Error {
    let payload = match payload.downcast::<Error>() {
        Ok(error) => return *error,
        Err(payload) => payload,
    };

    let payload = match payload.downcast::<Box<dyn std::error::Error + Send + Sync + 'static>>() {
        Ok(error) => return PanicError::Error(*error).into(),
        Err(payload) => payload,
    };

    let payload = match payload.downcast::<&'static str>() {
        Ok(text) => return PanicError::Message((*text).to_string()).into(),
        Err(payload) => payload,
    };

    match payload.downcast::<String>() {
        Ok(text) => PanicError::Message(*text).into(),
        Err(_) => PanicError::Opaque.into(),
    }
}
