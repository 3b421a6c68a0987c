//! Request/response types shared by every step in a chain.
//!
//! A chain never returns a response value from its steps. Instead each step
//! receives the [`Exchange`] for the request in flight and writes to its
//! [`ResponseWriter`], the same way a handler writes to a response writer in
//! a conventional HTTP server. Whatever has been written when the chain stops
//! is what the host sends back.

use bytes::{Bytes, BytesMut};
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use std::time::{Duration, Instant};

/// The HTTP request type handled by a chain.
///
/// The body is fully buffered so that steps can read it synchronously.
pub type Request = http::Request<Bytes>;

/// The HTTP response type produced by a chain.
pub type Response = http::Response<Full<Bytes>>;

/// A response under construction.
///
/// The status defaults to `200 OK`. Headers and body accumulate until the
/// exchange is turned into a [`Response`].
///
/// # Example
///
/// ```
/// use middle_core::exchange::ResponseWriter;
/// use http::StatusCode;
///
/// let mut writer = ResponseWriter::new();
/// writer.set_status(StatusCode::CREATED);
/// writer.write_str("created");
///
/// let response = writer.into_response();
/// assert_eq!(response.status(), StatusCode::CREATED);
/// ```
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    written: bool,
}

impl ResponseWriter {
    /// Creates an empty `200 OK` response writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.written = true;
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the response headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.written = true;
        &mut self.headers
    }

    /// Appends raw bytes to the body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
        self.written = true;
    }

    /// Appends text to the body.
    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Returns the body written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns true once anything has been set or written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Replaces the body with a plain-text error message.
    pub fn error(&mut self, status: StatusCode, message: &str) {
        self.set_status(status);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body.clear();
        self.write_str(message);
    }

    /// Replaces the body with a JSON document.
    pub fn json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        self.set_status(status);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body.clear();
        self.write(&body);
        Ok(())
    }

    /// Replaces the body with a JSON error envelope.
    ///
    /// ```json
    /// { "error": { "code": "...", "message": "..." } }
    /// ```
    pub fn json_error(&mut self, status: StatusCode, code: &str, message: &str) {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        self.set_status(status);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body.clear();
        self.write(body.to_string().as_bytes());
    }

    /// Finishes the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// One request in flight: the request plus the response being written.
///
/// This is the context every step of a plain chain receives. It is created
/// fresh for each dispatch and never shared between requests.
#[derive(Debug)]
pub struct Exchange {
    request: Request,
    response: ResponseWriter,
    started_at: Instant,
}

impl Exchange {
    /// Creates an exchange for `request` with an empty response.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: ResponseWriter::new(),
            started_at: Instant::now(),
        }
    }

    /// Returns the request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// Returns the response being written.
    #[must_use]
    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    /// Returns the response being written, for modification.
    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// Returns the time elapsed since the exchange was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Finishes the exchange, returning whatever response was written.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn request(method: &str, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    async fn body_of(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_default_response_is_empty_ok() {
        let writer = ResponseWriter::new();
        assert_eq!(writer.status(), StatusCode::OK);
        assert!(!writer.is_written());

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_of(response).await.is_empty());
    }

    #[test]
    fn test_write_accumulates_body() {
        let mut writer = ResponseWriter::new();
        writer.write_str("hello, ");
        writer.write(b"world");
        assert!(writer.is_written());
        assert_eq!(writer.body(), b"hello, world");
    }

    #[test]
    fn test_error_response() {
        let mut writer = ResponseWriter::new();
        writer.write_str("partial");
        writer.error(StatusCode::BAD_REQUEST, "Invalid input");

        assert_eq!(writer.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            writer.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(writer.body(), b"Invalid input");
    }

    #[test]
    fn test_json_error_response() {
        let mut writer = ResponseWriter::new();
        writer.json_error(
            StatusCode::UNAUTHORIZED,
            "AUTH_REQUIRED",
            "Authentication required",
        );
        assert_eq!(writer.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = serde_json::from_slice(writer.body()).unwrap();
        assert_eq!(body["error"]["code"], "AUTH_REQUIRED");
        assert_eq!(body["error"]["message"], "Authentication required");
    }

    #[test]
    fn test_json_body() {
        #[derive(Serialize)]
        struct User {
            id: u32,
        }

        let mut writer = ResponseWriter::new();
        writer.json(StatusCode::CREATED, &User { id: 7 }).unwrap();
        assert_eq!(writer.status(), StatusCode::CREATED);
        assert_eq!(writer.body(), br#"{"id":7}"#);
    }

    #[test]
    fn test_exchange_accessors() {
        let mut exchange = Exchange::new(request("POST", "/users/42?x=1"));
        assert_eq!(exchange.method(), Method::POST);
        assert_eq!(exchange.path(), "/users/42");

        exchange.response_mut().set_status(StatusCode::ACCEPTED);
        let response = exchange.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
