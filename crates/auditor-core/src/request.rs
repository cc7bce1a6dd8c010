//! Request type for the auditor chain

use crate::body::{self, Body, BoxError};
use bytes::Bytes;
use http::{header, request::Parts, HeaderMap, Method};

/// HTTP request travelling through the middleware chain
///
/// The body stays a stream until someone reads it. Middleware that needs the
/// bytes can [`take_body`](Request::take_body), inspect them, and hand an
/// equivalent body back with [`set_body`](Request::set_body).
pub struct Request {
    parts: Parts,
    body: Body,
}

impl Request {
    /// Create a request from its head and body
    pub fn new(parts: Parts, body: Body) -> Self {
        Self { parts, body }
    }

    /// Convert any `http::Request` whose body yields `Bytes`
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self::new(parts, body::boxed(body))
    }

    /// Get the HTTP method
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Get the headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// Get the raw query string
    pub fn query_string(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    /// Body length as declared by the client.
    ///
    /// Returns the `Content-Length` value when present and valid, `-1` when
    /// the length is unknown because the body uses a transfer coding, and `0`
    /// when the request declares no body at all.
    pub fn content_length(&self) -> i64 {
        let declared = self
            .parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok());

        match declared {
            Some(length) => length,
            None if self.parts.headers.contains_key(header::TRANSFER_ENCODING) => -1,
            None => 0,
        }
    }

    /// Take the body, leaving an empty one in its place
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, body::empty())
    }

    /// Replace the body
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Consume the request and return its body
    pub fn into_body(self) -> Body {
        self.body
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("version", &self.parts.version)
            .finish()
    }
}
