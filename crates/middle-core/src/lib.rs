//! # Middle Core
//!
//! Typed step composition for HTTP request handlers.
//!
//! A handler is built from an ordered list of steps. Each step receives the
//! request context plus the typed outputs of every earlier step, and either
//! produces its own output or fails. The first failure stops the chain.
//!
//! ```text
//! Request → step 1 → step 2 → ... → step N → Response
//!              │        │              │
//!              └─ error stops the chain ┴──→ Finally observer (unless Abort)
//! ```
//!
//! ## Flavors
//!
//! | Context | Builder | Handler |
//! |---------|---------|---------|
//! | [`Exchange`] | [`chain!`] / [`Chain`] | [`Pipeline`], [`Finally`] |
//! | [`Traced<R>`] | [`traced_chain!`] | [`Instrumented`], [`InstrumentedFinally`] |
//!
//! The traced flavor threads a request-local reporting scope and a root span
//! from a [`Reporter`] through every step, and contains panics at the
//! request boundary.
//!
//! ## Example
//!
//! ```
//! use middle_core::{chain, Abort, Handler};
//! use http::StatusCode;
//!
//! let handler = chain!(
//!     |ex, ()| {
//!         let id = ex.path().trim_start_matches("/users/").to_string();
//!         if id.is_empty() {
//!             ex.response_mut().error(StatusCode::BAD_REQUEST, "missing id");
//!             return Err(Abort.into());
//!         }
//!         Ok(id)
//!     },
//!     |ex, (id,)| {
//!         ex.response_mut().write_str(&format!("user {id}"));
//!         Ok(())
//!     },
//! )
//! .finally(|ex, error| {
//!     ex.response_mut()
//!         .error(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string());
//! });
//!
//! let request = http::Request::get("/users/42").body(bytes::Bytes::new()).unwrap();
//! assert_eq!(handler.call(request).status(), StatusCode::OK);
//! ```

#![doc(html_root_url = "https://docs.rs/middle-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod error;
pub mod exchange;
pub mod fixtures;
mod macros;
pub mod observe;
pub mod pipeline;
pub mod traced;

// Re-export main types at crate root
pub use chain::{Append, Chain, Halt, Start, Steps, Then};
pub use error::{is_abort, panic_error, Abort, Error, PanicError, StepResult};
pub use exchange::{Exchange, Request, Response, ResponseWriter};
pub use observe::{
    EventId, Level, Reporter, Scope, Span, SpanGuard, SpanOptions, SpanStatus, TraceContext,
    TraceFlags, TransactionSource,
};
pub use pipeline::{Finally, Handler, Outcome, Pipeline};
pub use traced::{Instrumented, InstrumentedFinally, Traced, DEFAULT_FLUSH_TIMEOUT};
