//! # Middle
//!
//! **Typed HTTP step chains with panic-safe, observable execution**
//!
//! A handler is an ordered list of steps. Each step sees the request
//! context and the typed outputs of every earlier step:
//!
//! - **Typed chaining** – step `N` receives a tuple of the outputs of steps
//!   `1..N`, checked at compile time
//! - **Early exit** – the first error stops the chain; [`Abort`](core::Abort)
//!   stops it silently
//! - **Finally** – an optional observer sees every non-abort failure
//! - **Observability** – traced chains run under a request scope and a root
//!   span, and panics are reported and contained at the request boundary
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use middle::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_defaults().with_env_prefix("MIDDLE").load()?;
//!     let telemetry = init_telemetry(config.telemetry_config())?;
//!
//!     let handler = traced_chain!(ConfiguredReporter;
//!         |cx, ()| Ok(cx.path().to_string()),
//!         |cx, (path,)| {
//!             cx.response_mut().write_str(&format!("hello from {path}"));
//!             Ok(())
//!         },
//!     )
//!     .instrument(telemetry.reporter()?)
//!     .with_flush_timeout(telemetry.flush_timeout());
//!
//!     let listener = bind("0.0.0.0:8080").await?;
//!     serve(listener, handler, ShutdownSignal::with_os_signals()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! | Module | Crate | Contents |
//! |--------|-------|----------|
//! | [`core`] | `middle-core` | Chains, pipelines, `Finally`, the traced variant |
//! | [`telemetry`] | `middle-telemetry` | Logging, OTLP export, reporter backends |
//! | [`config`] | `middle-config` | Layered TOML/JSON/env configuration |
//! | [`server`] | `middle-server` | Hyper accept loop with graceful shutdown |

#![doc(html_root_url = "https://docs.rs/middle/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use middle_core as core;

// Re-export the chain builders at the crate root
pub use middle_core::{chain, traced_chain};

// Re-export telemetry
pub use middle_telemetry as telemetry;

// Re-export configuration
pub use middle_config as config;

// Re-export server
pub use middle_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use middle::prelude::*;
///
/// let handler = chain!(|ex, ()| {
///     ex.response_mut().write_str("ok");
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub mod prelude {
    pub use middle_core::{
        chain, is_abort, traced_chain, Abort, Chain, Error, Exchange, Finally, Handler,
        Instrumented, InstrumentedFinally, Outcome, Pipeline, Reporter, Request, Response,
        ResponseWriter, Scope, Span, StepResult, Traced,
    };

    pub use middle_telemetry::{
        init_telemetry, ConfiguredReporter, TelemetryConfig, TelemetryGuard, TracingReporter,
    };

    pub use middle_config::{ConfigLoader, MiddleConfig};

    pub use middle_server::{bind, serve, ShutdownSignal};
}
