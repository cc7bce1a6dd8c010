//! # Auditor Core
//!
//! The request chain the auditor interceptor plugs into: a streaming
//! request/response model, the middleware stack, and a hyper server.
//!
//! This crate carries no auditing logic. Use `auditor` for the interceptor.

pub mod body;
mod handler;
pub mod middleware;
mod request;
mod response;
mod server;
#[cfg(any(test, feature = "test-utils"))]
mod test_client;

// Public API
pub use body::{Body, BodySender, BoxError};
pub use handler::handler_fn;
pub use middleware::{BoxedNext, LayerStack, MiddlewareLayer, ResponseFuture};
pub use request::Request;
pub use response::{IntoResponse, Response};
pub use server::{Server, ServerError};
#[cfg(any(test, feature = "test-utils"))]
pub use test_client::{TestClient, TestRequest, TestResponse};
