//! Response body tap.
//!
//! [`tap_response`] wraps a response body so every frame still reaches the
//! client in the same poll it was produced, while data frames are also copied
//! into a buffer. When the body finishes, fails, or is dropped, the callback
//! receives a [`TappedResponse`] exactly once.

use auditor_core::{body, Body, Response};
use bytes::{Bytes, BytesMut};
use futures_util::task::noop_waker_ref;
use http::{HeaderMap, StatusCode};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Callback run once the tap completes.
pub type OnComplete = Box<dyn FnOnce(TappedResponse) + Send + 'static>;

/// Everything the tap observed of one response.
#[derive(Debug, Clone)]
pub struct TappedResponse {
    pub status: StatusCode,
    /// Headers as the handler left them when it returned the response.
    pub headers: HeaderMap,
    /// All data frames the handler produced, concatenated.
    pub body: Bytes,
    pub end: TapEnd,
}

/// How the tapped body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapEnd {
    /// The inner body reached end of stream.
    Completed,
    /// The inner body yielded an error.
    Failed,
    /// The body was dropped before it finished, usually a client disconnect.
    Abandoned,
}

struct TapState {
    status: StatusCode,
    headers: HeaderMap,
    buffer: BytesMut,
    on_complete: OnComplete,
}

impl TapState {
    fn finish(self, end: TapEnd) {
        (self.on_complete)(TappedResponse {
            status: self.status,
            headers: self.headers,
            body: self.buffer.freeze(),
            end,
        });
    }
}

/// Body wrapper that copies data frames while forwarding them.
///
/// A server may drop a body without reading it, as for `HEAD` requests or
/// `204`/`304` responses. On drop the tap collects whatever the handler has
/// already produced, without waiting, so the record still holds it.
pub struct ResponseTap {
    inner: Body,
    state: Option<TapState>,
}

impl ResponseTap {
    pub fn new(
        inner: Body,
        status: StatusCode,
        headers: HeaderMap,
        on_complete: OnComplete,
    ) -> Self {
        Self {
            inner,
            state: Some(TapState {
                status,
                headers,
                buffer: BytesMut::new(),
                on_complete,
            }),
        }
    }

    /// Read every frame that is ready now and report how the body stands.
    fn drain_ready(&mut self) -> TapEnd {
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            if self.inner.is_end_stream() {
                return TapEnd::Completed;
            }
            match Pin::new(&mut self.inner).poll_frame(&mut cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    if let (Some(data), Some(state)) = (frame.data_ref(), self.state.as_mut()) {
                        state.buffer.extend_from_slice(data);
                    }
                }
                Poll::Ready(Some(Err(_))) => return TapEnd::Failed,
                Poll::Ready(None) => return TapEnd::Completed,
                Poll::Pending => return TapEnd::Abandoned,
            }
        }
    }
}

impl Drop for ResponseTap {
    fn drop(&mut self) {
        if self.state.is_some() {
            let end = self.drain_ready();
            if let Some(state) = self.state.take() {
                state.finish(end);
            }
        }
    }
}

impl HttpBody for ResponseTap {
    type Data = Bytes;
    type Error = <Body as HttpBody>::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let polled = ready!(Pin::new(&mut this.inner).poll_frame(cx));

        let end = match &polled {
            Some(Ok(frame)) => {
                if let (Some(data), Some(state)) = (frame.data_ref(), this.state.as_mut()) {
                    state.buffer.extend_from_slice(data);
                }
                // Servers stop polling once a body reports its end.
                this.inner.is_end_stream().then_some(TapEnd::Completed)
            }
            Some(Err(_)) => Some(TapEnd::Failed),
            None => Some(TapEnd::Completed),
        };

        if let Some(end) = end {
            if let Some(state) = this.state.take() {
                state.finish(end);
            }
        }

        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Wrap a response body in a [`ResponseTap`].
///
/// Status and headers are read from the response as returned by the handler;
/// the response itself goes out unchanged.
pub fn tap_response<F>(response: Response, on_complete: F) -> Response
where
    F: FnOnce(TappedResponse) + Send + 'static,
{
    let (parts, inner) = response.into_parts();
    let tap = ResponseTap::new(
        inner,
        parts.status,
        parts.headers.clone(),
        Box::new(on_complete),
    );
    Response::from_parts(parts, body::boxed(tap))
}
