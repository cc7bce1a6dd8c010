//! # auditor
//!
//! HTTP request/response auditing middleware.
//!
//! [`AuditLayer`] sits in an `auditor-core` chain. For every request it
//! snapshots the request, lets the downstream handler run, and taps the
//! response body as it streams to the client. When the response is done it
//! posts an [`AuditRecord`] as JSON to a remote collector on a background
//! task. The collector is never in the request path: a slow, failing or
//! unreachable collector only produces a warning in the logs.
//!
//! ## Features
//!
//! - **Non-destructive capture**: the handler reads the original request
//!   body; the client receives every response chunk as soon as it is written
//! - **Header redaction**: configured header names never leave the process,
//!   matched case-insensitively
//! - **Fire-and-forget delivery**: one `POST` per record under a timeout, no
//!   retries
//!
//! ## Quick Start
//!
//! ```ignore
//! use auditor::{AuditConfig, AuditLayer};
//! use auditor_core::{handler_fn, LayerStack, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt::init();
//!
//!     let audit = AuditLayer::new(
//!         AuditConfig::new("http://collector:8080/audit")
//!             .ignore_header("Authorization")
//!             .ignore_header("Cookie")
//!             .timeout("2s"),
//!     )?;
//!
//!     Server::new(LayerStack::new().with(audit), handler_fn(|_req| async { "ok" }))
//!         .run("127.0.0.1:3000")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod headers;
mod layer;
pub mod record;
pub mod tap;

pub use config::{AuditConfig, AuditSettings};
pub use dispatch::Dispatcher;
pub use error::{ConfigError, DeliveryError, DeliveryResult};
pub use filter::RedactionList;
pub use headers::MultiMap;
pub use layer::AuditLayer;
pub use record::{AuditRecord, RequestSnapshot, ResponseSnapshot};
pub use tap::{tap_response, ResponseTap, TapEnd, TappedResponse};
