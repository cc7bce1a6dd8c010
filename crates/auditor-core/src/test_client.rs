//! TestClient for driving a chain without network binding
//!
//! # Example
//!
//! ```rust,ignore
//! use auditor_core::{handler_fn, LayerStack, TestClient, TestRequest};
//!
//! #[tokio::test]
//! async fn test_hello() {
//!     let client = TestClient::new(LayerStack::new(), handler_fn(|_req| async { "Hello" }));
//!
//!     let response = client.get("/").await;
//!     response.assert_status(200);
//!     assert_eq!(response.text(), "Hello");
//! }
//! ```

use crate::body;
use crate::middleware::{BoxedNext, LayerStack};
use crate::request::Request;
use crate::response::Response;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;

/// Sends simulated requests through a [`LayerStack`] and a handler
pub struct TestClient {
    layers: Arc<LayerStack>,
    handler: BoxedNext,
}

impl TestClient {
    /// Create a client for the given chain
    pub fn new(layers: LayerStack, handler: BoxedNext) -> Self {
        Self {
            layers: Arc::new(layers),
            handler,
        }
    }

    /// Send a GET request
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(TestRequest::get(path)).await
    }

    /// Send a request with full control
    pub async fn request(&self, req: TestRequest) -> TestResponse {
        let response = self.layers.execute(req.into_request(), self.handler.clone()).await;
        TestResponse::from_response(response).await
    }
}

/// Test request builder
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl TestRequest {
    /// Create a request with the given method and path (query string included)
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Append a header; repeated names keep every value
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (
            key.parse::<http::header::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, val);
        }
        self
    }

    /// Set the request body
    ///
    /// A `Content-Length` header is added when sending unless the request
    /// already declares a length or a transfer coding.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn into_request(mut self) -> Request {
        if let Some(body) = &self.body {
            if !self.headers.contains_key(header::CONTENT_LENGTH)
                && !self.headers.contains_key(header::TRANSFER_ENCODING)
            {
                self.headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
            }
        }

        let uri: http::Uri = self.path.parse().unwrap_or_else(|_| http::Uri::from_static("/"));
        let mut http_req = http::Request::new(());
        *http_req.method_mut() = self.method;
        *http_req.uri_mut() = uri;
        *http_req.headers_mut() = self.headers;
        let (parts, _) = http_req.into_parts();

        let body = match self.body {
            Some(bytes) => body::full(bytes),
            None => body::empty(),
        };
        Request::new(parts, body)
    }
}

/// Fully collected response with assertion helpers
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    async fn from_response(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();

        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get a header value as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the raw body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the body as text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Assert the status code
    pub fn assert_status(&self, expected: u16) -> &Self {
        assert_eq!(
            self.status.as_u16(),
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status.as_u16(),
            self.text()
        );
        self
    }
}
