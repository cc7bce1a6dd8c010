//! HTTP server implementation

use crate::middleware::{BoxedNext, LayerStack};
use crate::request::Request;
use http::StatusCode;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Errors raised while binding or accepting connections
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be parsed.
    #[error("invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    /// Binding or accepting on the socket failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves a [`LayerStack`] wrapped around a downstream handler over HTTP/1.1
#[derive(Clone)]
pub struct Server {
    layers: Arc<LayerStack>,
    handler: BoxedNext,
}

impl Server {
    pub fn new(layers: LayerStack, handler: BoxedNext) -> Self {
        Self {
            layers: Arc::new(layers),
            handler,
        }
    }

    /// Bind `addr` and serve until the process exits
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections accepted from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Serve until `signal` resolves
    ///
    /// Connections already accepted keep running to completion on their own
    /// tasks.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        signal: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        info!("auditor server listening on http://{}", local_addr);

        tokio::pin!(signal);

        loop {
            let (stream, _remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut signal => {
                    info!("auditor server shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let layers = self.layers.clone();
            let handler = self.handler.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let layers = layers.clone();
                    let handler = handler.clone();
                    async move {
                        let method = req.method().clone();
                        let path = req.uri().path().to_string();
                        let start = Instant::now();

                        let response = layers.execute(Request::from_http(req), handler).await;

                        log_request(&method, &path, response.status(), start);
                        Ok::<_, Infallible>(response)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Connection error: {}", err);
                }
            });
        }
    }
}

/// Log that the chain produced a response head
fn log_request(method: &http::Method, path: &str, status: StatusCode, start: Instant) {
    let elapsed = start.elapsed();

    if status.is_server_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request failed"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
    }
}
