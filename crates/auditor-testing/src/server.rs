use super::expectation::{Expectation, MockResponse};
use super::matcher::RequestMatcher;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};

type GenericError = Box<dyn std::error::Error + Send + Sync>;
type Result<T> = std::result::Result<T, GenericError>;

/// A mock HTTP server
///
/// Requests are answered by the most recently registered matching
/// expectation. Requests matching nothing get `404`. Every request is
/// recorded in arrival order.
pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

struct Shared {
    state: Mutex<ServerState>,
    arrived: Notify,
}

struct ServerState {
    expectations: Vec<Expectation>,
    received: Vec<RecordedRequest>,
    unmatched: Vec<RecordedRequest>,
}

/// A request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: http::Method,
    pub path: String,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Get a header value as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl MockServer {
    /// Start a new mock server on a random port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            state: Mutex::new(ServerState {
                expectations: Vec::new(),
                received: Vec::new(),
                unmatched: Vec::new(),
            }),
            arrived: Notify::new(),
        });

        let shared_clone = shared.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut stop_future = shutdown_rx;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let shared = shared_clone.clone();

                                tokio::spawn(async move {
                                    if let Err(err) = hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                                        .serve_connection(io, service_fn(move |req| handle_request(req, shared.clone())))
                                        .await
                                    {
                                        tracing::debug!("mock server connection error: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => tracing::debug!("mock server accept error: {}", e),
                        }
                    }
                    _ = &mut stop_future => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shared,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Add an expectation
    pub fn expect(&self, matcher: RequestMatcher) -> ExpectationBuilder {
        ExpectationBuilder {
            server: self.shared.clone(),
            expectation: Some(Expectation::new(matcher)),
        }
    }

    /// Every request received so far, in arrival order
    pub fn received_requests(&self) -> Vec<RecordedRequest> {
        self.shared.state.lock().unwrap().received.clone()
    }

    /// Requests that matched no expectation
    pub fn unmatched_requests(&self) -> Vec<RecordedRequest> {
        self.shared.state.lock().unwrap().unmatched.clone()
    }

    /// Wait until at least `count` requests have arrived
    ///
    /// Returns whatever has arrived once `timeout` elapses, so callers should
    /// assert on the length.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.shared.arrived.notified();
            {
                let state = self.shared.state.lock().unwrap();
                if state.received.len() >= count {
                    return state.received.clone();
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received_requests();
            }
        }
    }

    /// Verify that all expectations were met
    pub fn verify(&self) {
        let state = self.shared.state.lock().unwrap();
        for exp in &state.expectations {
            assert!(
                exp.is_satisfied(),
                "Expectation {:?} expected {:?} calls, got {}",
                exp.matcher,
                exp.times,
                exp.call_count
            );
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Registers its expectation with the server when dropped
pub struct ExpectationBuilder {
    server: Arc<Shared>,
    expectation: Option<Expectation>,
}

impl ExpectationBuilder {
    pub fn respond_with(mut self, response: MockResponse) -> Self {
        self.expectation = self.expectation.take().map(|exp| exp.respond_with(response));
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation = self.expectation.take().map(|exp| exp.times(n));
        self
    }

    pub fn any_times(mut self) -> Self {
        self.expectation = self.expectation.take().map(Expectation::any_times);
        self
    }
}

impl Drop for ExpectationBuilder {
    fn drop(&mut self) {
        if let Some(exp) = self.expectation.take() {
            let mut state = self.server.state.lock().unwrap();
            state.expectations.push(exp);
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    shared: Arc<Shared>,
) -> Result<Response<Full<Bytes>>> {
    let (parts, body) = req.into_parts();
    let body_bytes = body.collect().await?.to_bytes();

    let recorded = RecordedRequest {
        method: parts.method.clone(),
        path: parts.uri.path().to_string(),
        headers: parts.headers.clone(),
        body: body_bytes.clone(),
    };

    let matched = {
        let mut state = shared.state.lock().unwrap();
        state.received.push(recorded.clone());

        // Later expectations override earlier ones.
        let matching_idx = state
            .expectations
            .iter()
            .rposition(|exp| {
                exp.matcher
                    .matches(&parts.method, parts.uri.path(), &parts.headers, &body_bytes)
            });

        match matching_idx {
            Some(idx) => {
                let exp = &mut state.expectations[idx];
                exp.call_count += 1;
                Some(exp.response.clone())
            }
            None => {
                state.unmatched.push(recorded);
                None
            }
        }
    };
    shared.arrived.notify_waiters();

    let Some(resp_def) = matched else {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("No expectation matched")))?);
    };

    if let Some(delay) = resp_def.delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = Response::builder().status(resp_def.status);
    for (k, v) in &resp_def.headers {
        response = response.header(k, v);
    }

    Ok(response.body(Full::new(resp_def.body))?)
}
