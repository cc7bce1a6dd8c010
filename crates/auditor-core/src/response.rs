//! Response types for the auditor chain
//!
//! [`Response`] is a plain `http::Response` over the streaming [`Body`].
//! Handlers can return anything implementing [`IntoResponse`].
//!
//! | Type | Status | Content-Type |
//! |------|--------|--------------|
//! | `()` | 200 | - |
//! | `&'static str` / `String` | 200 | text/plain |
//! | `Bytes` / `Vec<u8>` | 200 | application/octet-stream |
//! | `(StatusCode, T)` | given | from `T` |
//! | [`Response`] | as built | as built |

use crate::body::{self, Body};
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};

/// HTTP Response type
pub type Response = http::Response<Body>;

/// Trait for types that can be converted into an HTTP response
pub trait IntoResponse {
    /// Convert self into a Response
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

// `http::Response::new` leaves the status at its default, 200 OK.
impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::new(body::empty())
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        text(Bytes::from_static(self.as_bytes()))
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        text(Bytes::from(self))
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response {
        binary(self)
    }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> Response {
        binary(Bytes::from(self))
    }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        *response.status_mut() = self.0;
        response
    }
}

fn text(data: Bytes) -> Response {
    with_content_type(data, "text/plain; charset=utf-8")
}

fn binary(data: Bytes) -> Response {
    with_content_type(data, "application/octet-stream")
}

fn with_content_type(data: Bytes, content_type: &'static str) -> Response {
    let mut response = Response::new(body::full(data));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
