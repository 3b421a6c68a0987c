//! # Middle Server
//!
//! Thin host adapter for composed handlers.
//!
//! - [`HandlerService`] turns any [`Handler`](middle_core::Handler) into a
//!   `hyper` service
//! - [`serve`] runs an HTTP/1 accept loop on a Tokio listener
//! - [`ShutdownSignal`] stops the loop and drains open connections
//!
//! ## Example
//!
//! ```rust,ignore
//! use middle_core::chain;
//! use middle_server::{bind, serve, ShutdownSignal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = chain!(|ex, ()| {
//!         ex.response_mut().write_str("ok");
//!         Ok(())
//!     });
//!
//!     let listener = bind("0.0.0.0:8080").await?;
//!     serve(listener, handler, ShutdownSignal::with_os_signals()).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/middle-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod server;
mod service;
pub mod shutdown;

pub use error::ServeError;
pub use server::{bind, serve, serve_with_options, ServeOptions};
pub use service::HandlerService;
pub use shutdown::{ShutdownReceiver, ShutdownSignal};
