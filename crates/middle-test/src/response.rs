//! Collected handler responses and assertions over them.

use crate::error::TestError;
use bytes::Bytes;
use http::{header, HeaderMap, StatusCode};
use http_body_util::BodyExt;
use middle_core::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// A handler response with its body collected into memory.
///
/// Assertion methods return `&Self` so they can be chained:
///
/// ```
/// # use middle_test::TestResponse;
/// # use http::{HeaderMap, StatusCode};
/// let response = TestResponse::new(StatusCode::OK, HeaderMap::new(), "pong".into());
/// response.assert_status(StatusCode::OK).assert_text("pong");
/// ```
#[derive(Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Collects a handler response.
    ///
    /// # Errors
    ///
    /// Returns `TestError::BodyRead` if the body cannot be collected.
    pub async fn from_response(response: Response) -> Result<Self, TestError> {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();

        Ok(Self::new(parts.status, parts.headers, body))
    }

    /// Builds a response from parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value, if present and visible ASCII.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|value| value.to_str().ok())
    }

    /// The `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns `TestError::BodyRead` if the body is not UTF-8.
    pub fn text(&self) -> Result<&str, TestError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| TestError::BodyRead(format!("Invalid UTF-8: {e}")))
    }

    /// Body decoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns `TestError::Json` if the body does not decode into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The `(code, message)` pair of a JSON error envelope, as written by
    /// [`ResponseWriter::json_error`](middle_core::ResponseWriter::json_error).
    #[must_use]
    pub fn error_envelope(&self) -> Option<(String, String)> {
        let value: Value = self.json().ok()?;
        let error = value.get("error")?;
        let code = error.get("code")?.as_str()?.to_string();
        let message = error.get("message")?.as_str()?.to_string();
        Some((code, message))
    }

    /// # Panics
    ///
    /// Panics if the status differs.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "expected status {expected}, got {} with body {:?}",
            self.status, self.body
        );
        self
    }

    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        match self.header(name) {
            Some(actual) => assert_eq!(actual, expected.as_ref(), "header '{name}' mismatch"),
            None => panic!("header '{name}' not found"),
        }
        self
    }

    /// # Panics
    ///
    /// Panics if the body is not empty.
    pub fn assert_empty_body(&self) -> &Self {
        assert!(
            self.body.is_empty(),
            "expected empty body, got {:?}",
            self.body
        );
        self
    }

    /// # Panics
    ///
    /// Panics if the body is not the given text.
    pub fn assert_text(&self, expected: impl AsRef<str>) -> &Self {
        match self.text() {
            Ok(actual) => assert_eq!(actual, expected.as_ref(), "body mismatch"),
            Err(e) => panic!("{e}"),
        }
        self
    }

    /// # Panics
    ///
    /// Panics if the body does not contain `needle`.
    pub fn assert_text_contains(&self, needle: impl AsRef<str>) -> &Self {
        let needle = needle.as_ref();
        match self.text() {
            Ok(actual) => assert!(
                actual.contains(needle),
                "body should contain '{needle}', got: {actual}"
            ),
            Err(e) => panic!("{e}"),
        }
        self
    }

    /// # Panics
    ///
    /// Panics if the body is not JSON equal to `expected`.
    pub fn assert_json(&self, expected: &Value) -> &Self {
        match self.json::<Value>() {
            Ok(actual) => assert_eq!(&actual, expected, "JSON body mismatch"),
            Err(e) => panic!("{e}"),
        }
        self
    }

    /// Asserts a field addressed by a dotted path such as `"items.0.id"`.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or differs.
    pub fn assert_json_field(&self, path: &str, expected: &Value) -> &Self {
        let json = match self.json::<Value>() {
            Ok(json) => json,
            Err(e) => panic!("{e}"),
        };
        match lookup(&json, path) {
            Some(actual) => assert_eq!(actual, expected, "JSON field '{path}' mismatch"),
            None => panic!("JSON path '{path}' not found in {json}"),
        }
        self
    }

    /// Asserts an error envelope with the given status and code.
    ///
    /// # Panics
    ///
    /// Panics if the status differs or the body is not an envelope with
    /// that code.
    pub fn assert_error(&self, status: StatusCode, code: &str) -> &Self {
        self.assert_status(status);
        match self.error_envelope() {
            Some((actual, _)) => assert_eq!(actual, code, "error code mismatch"),
            None => panic!("expected error envelope, got {:?}", self.body),
        }
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match segment.parse::<usize>() {
            Ok(index) => current.get(index),
            Err(_) => current.get(segment),
        })
}
