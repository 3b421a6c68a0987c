//! HTTP/1 accept loop.
//!
//! [`serve`] accepts connections on a bound listener and serves each one
//! with a [`HandlerService`] until the shutdown signal fires. Open
//! connections are then asked to finish their in-flight request, and the
//! loop waits for them up to [`ServeOptions::shutdown_timeout`].
//!
//! # Example
//!
//! ```rust,ignore
//! use middle_core::chain;
//! use middle_server::{bind, serve, ShutdownSignal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), middle_server::ServeError> {
//!     let handler = chain!(|ex, ()| {
//!         ex.response_mut().write_str("ok");
//!         Ok(())
//!     });
//!
//!     let listener = bind("0.0.0.0:8080").await?;
//!     serve(listener, handler, ShutdownSignal::with_os_signals()).await
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use middle_core::Handler;

use crate::error::ServeError;
use crate::service::HandlerService;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Tuning for [`serve_with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeOptions {
    /// How long to wait for open connections after shutdown is triggered.
    pub shutdown_timeout: Duration,

    /// Keep-alive for HTTP/1 connections.
    pub keep_alive: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            keep_alive: true,
        }
    }
}

/// Binds a TCP listener.
///
/// # Errors
///
/// Returns `ServeError::InvalidAddress` if `addr` is not a socket address
/// and `ServeError::Bind` if it cannot be bound.
pub async fn bind(addr: &str) -> Result<TcpListener, ServeError> {
    let socket_addr: SocketAddr = addr.parse().map_err(|e: std::net::AddrParseError| {
        ServeError::InvalidAddress {
            addr: addr.to_string(),
            reason: e.to_string(),
        }
    })?;

    TcpListener::bind(socket_addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: socket_addr,
            source,
        })
}

/// Serves `handler` on `listener` until `shutdown` is triggered.
///
/// # Errors
///
/// Returns `ServeError::Io` if the listener's local address is unavailable.
pub async fn serve<H: Handler>(
    listener: TcpListener,
    handler: H,
    shutdown: ShutdownSignal,
) -> Result<(), ServeError> {
    serve_with_options(listener, handler, shutdown, ServeOptions::default()).await
}

/// Serves `handler` on `listener` with explicit options.
///
/// # Errors
///
/// Returns `ServeError::Io` if the listener's local address is unavailable.
pub async fn serve_with_options<H: Handler>(
    listener: TcpListener,
    handler: H,
    shutdown: ShutdownSignal,
    options: ServeOptions,
) -> Result<(), ServeError> {
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "listening");

    let service = HandlerService::new(handler);
    let tracker = ConnectionTracker::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let service = service.clone();
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, service, shutdown, options).await {
                                tracing::debug!(remote = %remote_addr, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to accept connection");
                    }
                }
            }

            () = shutdown.recv() => {
                tracing::info!("shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    tracing::info!(
        timeout = ?options.shutdown_timeout,
        active = tracker.active_connections(),
        "waiting for open connections"
    );

    tokio::select! {
        () = tracker.wait_for_shutdown() => {
            tracing::info!("all connections closed");
        }
        () = tokio::time::sleep(options.shutdown_timeout) => {
            tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }
    }

    Ok(())
}

async fn serve_connection<H: Handler>(
    stream: TcpStream,
    service: HandlerService<H>,
    shutdown: ShutdownSignal,
    options: ServeOptions,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let conn = http1::Builder::new()
        .keep_alive(options.keep_alive)
        .serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty};
    use middle_core::chain;

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let result = bind("not-an-address").await;
        assert!(matches!(result, Err(ServeError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let handler = chain!(|_ex, ()| Ok(()));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            serve(listener, handler, shutdown),
        )
        .await;

        assert!(result.expect("serve should return").is_ok());
    }

    #[tokio::test]
    async fn test_serve_round_trip() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();

        let handler = chain!(
            |ex, ()| Ok(ex.path().to_string()),
            |ex, (path,)| {
                ex.response_mut().write_str(&format!("hello from {path}"));
                Ok(())
            },
        );
        let server = tokio::spawn(serve_with_options(
            listener,
            handler,
            shutdown.clone(),
            ServeOptions {
                shutdown_timeout: Duration::from_secs(1),
                keep_alive: false,
            },
        ));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let request = http::Request::get("/greeting")
            .header(http::header::HOST, addr.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "hello from /greeting");

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop")
            .expect("server task should not panic");
        assert!(result.is_ok());
    }
}
