//! In-memory client for composed handlers.

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use bytes::Bytes;
use http::{Method, StatusCode};
use middle_core::{chain, Handler};
use std::fmt;
use std::sync::Arc;

/// Dispatches requests straight into a [`Handler`], without a socket.
///
/// # Example
///
/// ```
/// use middle_core::chain;
/// use middle_test::TestClient;
///
/// # tokio_test::block_on(async {
/// let client = TestClient::new(chain!(|ex, ()| {
///     ex.response_mut().write_str("pong");
///     Ok(())
/// }));
///
/// client.get("/ping").send().await.assert_text("pong");
/// # });
/// ```
#[must_use]
#[derive(Clone)]
pub struct TestClient {
    handler: Arc<dyn Handler>,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Wraps a handler.
    pub fn new(handler: impl Handler) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Wraps a shared handler.
    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            default_headers: Vec::new(),
        }
    }

    /// A client whose handler answers with the request's method, path and
    /// body as JSON.
    pub fn echo() -> Self {
        Self::new(chain!(|ex, ()| {
            let echoed = serde_json::json!({
                "method": ex.method().as_str(),
                "path": ex.path(),
                "body": String::from_utf8_lossy(ex.request().body()),
            });
            ex.response_mut().json(StatusCode::OK, &echoed)?;
            Ok(())
        }))
    }

    /// A client whose handler always answers with `status` and `body`.
    pub fn fixed_response(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(chain!(move |ex, ()| {
            let response = ex.response_mut();
            response.set_status(status);
            response.write_str(&body);
            Ok(())
        }))
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::get(uri))
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::post(uri))
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::put(uri))
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::patch(uri))
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequest::delete(uri))
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequestBuilder::new(method, uri))
    }

    /// Runs a built request through the handler.
    ///
    /// # Errors
    ///
    /// Returns `TestError::BodyRead` if the response body cannot be
    /// collected.
    pub async fn dispatch(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let response = self.handler.call(request.into_request());
        TestResponse::from_response(response).await
    }
}

impl fmt::Debug for TestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClient")
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

/// A request being built against a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, builder: TestRequestBuilder) -> Self {
        let builder = client
            .default_headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value));
        Self { client, builder }
    }

    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the `Content-Type` header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets a bearer token.
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.builder = self.builder.bearer_token(token);
        self
    }

    /// Continues an upstream trace.
    pub fn traceparent(mut self, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.traceparent(value);
        self
    }

    /// Sets a raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the response cannot be
    /// read. Use [`try_send`](Self::try_send) to handle those errors.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request, returning build and read errors.
    ///
    /// # Errors
    ///
    /// Returns any error recorded while building the request, or
    /// `TestError::BodyRead` if the response body cannot be collected.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.dispatch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use middle_core::fixtures::RecordingReporter;
    use middle_core::observe::SpanStatus;
    use middle_core::{traced_chain, Abort, Span, StepResult};
    use serde_json::json;

    #[tokio::test]
    async fn test_echo() {
        let client = TestClient::echo();
        client
            .post("/orders")
            .body("hello")
            .send()
            .await
            .assert_status(StatusCode::OK)
            .assert_json(&json!({"method": "POST", "path": "/orders", "body": "hello"}));
    }

    #[tokio::test]
    async fn test_fixed_response() {
        let client = TestClient::fixed_response(StatusCode::ACCEPTED, "queued");
        client
            .delete("/jobs/1")
            .send()
            .await
            .assert_status(StatusCode::ACCEPTED)
            .assert_text("queued");
    }

    #[tokio::test]
    async fn test_default_headers() {
        let client = TestClient::new(chain!(|ex, ()| {
            let tenant = ex
                .request()
                .headers()
                .get("x-tenant")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            ex.response_mut().write_str(&tenant);
            Ok(())
        }))
        .with_default_header("X-Tenant", "acme");

        client.get("/").send().await.assert_text("acme");
    }

    #[tokio::test]
    async fn test_try_send_reports_build_error() {
        let client = TestClient::echo();
        let result = client.get("/").header("bad header", "x").try_send().await;
        assert!(matches!(result, Err(TestError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn test_abort_keeps_partial_response() {
        let client = TestClient::new(
            chain!(
                |ex, ()| {
                    if ex.request().headers().contains_key("authorization") {
                        Ok(())
                    } else {
                        ex.response_mut().json_error(
                            StatusCode::UNAUTHORIZED,
                            "unauthorized",
                            "missing token",
                        );
                        Err(Abort.into())
                    }
                },
                |ex, ((),)| {
                    ex.response_mut().write_str("secret");
                    Ok(())
                },
            )
            .finally(|ex, _error| {
                ex.response_mut().set_status(StatusCode::INTERNAL_SERVER_ERROR);
            }),
        );

        client
            .get("/vault")
            .send()
            .await
            .assert_error(StatusCode::UNAUTHORIZED, "unauthorized");
        client
            .get("/vault")
            .bearer_token("t")
            .send()
            .await
            .assert_status(StatusCode::OK)
            .assert_text("secret");
    }

    #[tokio::test]
    async fn test_traced_chain_through_client() {
        let reporter = RecordingReporter::new();
        let client = TestClient::new(
            traced_chain!(RecordingReporter;
                |cx, ()| -> StepResult<u32> {
                    cx.span_mut().set_tag("stage", "parse");
                    Ok(7)
                },
                |cx, (count,)| {
                    cx.response_mut().write_str(&count.to_string());
                    Ok(())
                },
            )
            .instrument(reporter.clone()),
        );

        client.get("/count").send().await.assert_text("7");

        let spans = reporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET /count");
        assert_eq!(spans[0].status, Some(SpanStatus::Ok));
        assert_eq!(spans[0].tags.get("stage").map(String::as_str), Some("parse"));
    }

    #[tokio::test]
    async fn test_traced_panic_reported() {
        let reporter = RecordingReporter::new();
        let client = TestClient::new(
            traced_chain!(RecordingReporter;
                |_cx, ()| -> StepResult<()> { panic!("stock underflow") },
            )
            .instrument(reporter.clone())
            .finally(|cx, _error| {
                cx.response_mut()
                    .json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "try again");
            }),
        );

        client
            .post("/checkout")
            .send()
            .await
            .assert_error(StatusCode::INTERNAL_SERVER_ERROR, "internal");

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message, "panic: stock underflow");
        assert_eq!(reports[0].path, "/checkout");
    }
}
