//! # Middle Test
//!
//! In-memory testing for composed handlers. Requests go straight into a
//! [`Handler`](middle_core::Handler), so plain chains, `Finally` observers
//! and instrumented chains are all exercised exactly as a server would
//! call them, without binding a port.
//!
//! ## Example
//!
//! ```
//! use http::StatusCode;
//! use middle_core::{chain, Abort};
//! use middle_test::TestClient;
//!
//! # tokio_test::block_on(async {
//! let client = TestClient::new(chain!(
//!     |ex, ()| {
//!         let Some(id) = ex.path().strip_prefix("/users/").map(str::to_string) else {
//!             ex.response_mut().json_error(StatusCode::NOT_FOUND, "not_found", "no route");
//!             return Err(Abort.into());
//!         };
//!         Ok(id)
//!     },
//!     |ex, (id,)| {
//!         ex.response_mut().json(StatusCode::OK, &serde_json::json!({ "id": id }))?;
//!         Ok(())
//!     },
//! ));
//!
//! client
//!     .get("/users/42")
//!     .send()
//!     .await
//!     .assert_status(StatusCode::OK)
//!     .assert_json_field("id", &serde_json::json!("42"));
//!
//! client
//!     .get("/orders")
//!     .send()
//!     .await
//!     .assert_error(StatusCode::NOT_FOUND, "not_found");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/middle-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
