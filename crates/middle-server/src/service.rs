//! Hyper service adapter for composed handlers.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::Service;

use middle_core::{Handler, Response};

/// Serves a [`Handler`] as a `hyper` service.
///
/// Each request body is collected into memory, then the handler runs on
/// Tokio's blocking pool, since steps are synchronous and a traced handler
/// may wait on a flush after a panic. A handler that panics (possible for
/// plain chains, which do not contain panics) yields an empty `500`.
#[derive(Debug)]
pub struct HandlerService<H> {
    handler: Arc<H>,
}

impl<H> HandlerService<H> {
    /// Wraps a handler.
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Wraps a shared handler.
    pub fn from_arc(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Returns the wrapped handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H, B> Service<Request<B>> for HandlerService<H>
where
    H: Handler,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display + Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn call(&self, request: Request<B>) -> Self::Future {
        let handler = Arc::clone(&self.handler);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read request body");
                    return Ok(empty(StatusCode::BAD_REQUEST));
                }
            };
            let request = Request::from_parts(parts, body);

            match tokio::task::spawn_blocking(move || Handler::call(&*handler, request)).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    tracing::error!(error = %e, "handler did not complete");
                    Ok(empty(StatusCode::INTERNAL_SERVER_ERROR))
                }
            }
        })
    }
}

fn empty(status: StatusCode) -> Response {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use middle_core::{chain, Abort};

    fn request(path: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::post(path)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn body_of(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_service_calls_handler() {
        let service = HandlerService::new(chain!(|ex, ()| {
            let echoed = ex.request().body().clone();
            ex.response_mut().write(&echoed);
            Ok(())
        }));

        let response = service.call(request("/echo", "ping")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "ping");
    }

    #[tokio::test]
    async fn test_service_keeps_partial_response_on_abort() {
        let service = HandlerService::new(chain!(|ex, ()| {
            ex.response_mut().error(StatusCode::FORBIDDEN, "no");
            Err(Abort.into())
        }));

        let response = service.call(request("/", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_service_turns_handler_panic_into_500() {
        let service = HandlerService::new(chain!(|_ex, ()| -> middle_core::StepResult<()> {
            panic!("boom")
        }));

        let response = service.call(request("/", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_of(response).await.is_empty());
    }
}
