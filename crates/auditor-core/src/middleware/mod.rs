//! Middleware infrastructure
//!
//! Middleware implements [`MiddlewareLayer`] and is collected in a
//! [`LayerStack`] that wraps the downstream handler.
//!
//! # Example
//!
//! ```rust,ignore
//! use auditor_core::{handler_fn, LayerStack, Server};
//!
//! let layers = LayerStack::new().with(MyLayer::new());
//! let handler = handler_fn(|_req| async { "ok" });
//! Server::new(layers, handler).run("127.0.0.1:8080").await?;
//! ```

mod layer;

pub use layer::{BoxedNext, LayerStack, MiddlewareLayer, ResponseFuture};
