//! Typed configuration for `middle` services.
//!
//! This crate provides a strongly-typed configuration layer for the
//! telemetry and panic reporting that surrounds composed handlers:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use middle_config::ConfigLoader;
//!
//! # fn main() -> Result<(), middle_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_dotenv()?
//!     .with_file("middle.toml")?
//!     .with_env_prefix("MIDDLE")
//!     .load()?;
//!
//! let telemetry = config.telemetry_config();
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [telemetry]
//! service_name = "billing"
//! service_version = "1.0.0"
//! environment = "production"
//!
//! [telemetry.tracing]
//! enabled = true
//! otlp_endpoint = "http://localhost:4317"
//! sampling_ratio = 0.1
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.reporter]
//! backend = "otel"
//! flush_timeout_ms = 2000
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden via environment variables using the format
//! `PREFIX__SECTION__KEY`. For example:
//!
//! - `MIDDLE__TELEMETRY__SERVICE_NAME=billing`
//! - `MIDDLE__TELEMETRY__LOGGING__FORMAT=pretty`
//! - `MIDDLE__TELEMETRY__REPORTER__FLUSH_TIMEOUT_MS=500`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
