//! Downstream handlers
//!
//! The end of every chain is a [`BoxedNext`]. [`handler_fn`] builds one from
//! an async closure returning anything that implements [`IntoResponse`].

use crate::middleware::{BoxedNext, ResponseFuture};
use crate::request::Request;
use crate::response::IntoResponse;
use std::future::Future;
use std::sync::Arc;

/// Wrap an async function as the final handler of a chain
///
/// # Example
///
/// ```rust,ignore
/// let handler = handler_fn(|req: Request| async move {
///     format!("you asked for {}", req.path())
/// });
/// ```
pub fn handler_fn<F, Fut, R>(f: F) -> BoxedNext
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    Arc::new(move |req: Request| {
        let fut = f(req);
        Box::pin(async move { fut.await.into_response() }) as ResponseFuture
    })
}
