//! Server error types.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that stop [`serve`](crate::serve) or [`bind`](crate::bind).
#[derive(Debug, Error)]
pub enum ServeError {
    /// The address could not be parsed.
    #[error("Invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The address as given.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The listener could not be bound.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// The address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error on the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
