//! Streaming body type shared by requests and responses
//!
//! Every body that travels through the chain is erased into [`Body`], a boxed
//! `http_body::Body` yielding [`Bytes`] frames. Handlers that produce their
//! output incrementally can use [`channel`] and push chunks through a
//! [`BodySender`] while the client is already receiving earlier ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use auditor_core::body;
//!
//! let (tx, body) = body::channel(8);
//! tokio::spawn(async move {
//!     tx.send_data("chunk 1").await.ok();
//!     tx.send_data("chunk 2").await.ok();
//! });
//! let response = http::Response::new(body);
//! ```

use bytes::Bytes;
use futures_util::{stream, Stream};
use http_body::Frame;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use tokio::sync::mpsc;

/// Boxed error type carried by body frames.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased streaming HTTP body.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// A body with no data.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body holding a single, already complete chunk.
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Erase any compatible body into [`Body`].
pub fn boxed<B>(body: B) -> Body
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Build a body from a stream of frames.
pub fn from_stream<S>(frames: S) -> Body
where
    S: Stream<Item = Result<Frame<Bytes>, BoxError>> + Send + 'static,
{
    StreamBody::new(frames).boxed_unsync()
}

/// Create a body fed by a [`BodySender`].
///
/// The body ends once every sender has been dropped. `capacity` bounds the
/// number of frames queued before `send_*` waits for the reader.
pub fn channel(capacity: usize) -> (BodySender, Body) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    });
    (BodySender { tx }, from_stream(frames))
}

/// Returned when the reading side of a [`channel`] body has gone away.
#[derive(Debug, thiserror::Error)]
#[error("body receiver dropped")]
pub struct BodyClosed;

/// Writing half of a [`channel`] body.
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: mpsc::Sender<Result<Frame<Bytes>, BoxError>>,
}

impl BodySender {
    /// Send one data chunk.
    pub async fn send_data(&self, data: impl Into<Bytes>) -> Result<(), BodyClosed> {
        self.tx
            .send(Ok(Frame::data(data.into())))
            .await
            .map_err(|_| BodyClosed)
    }

    /// Terminate the body with an error.
    pub async fn abort(self, error: impl Into<BoxError>) {
        let _ = self.tx.send(Err(error.into())).await;
    }
}
