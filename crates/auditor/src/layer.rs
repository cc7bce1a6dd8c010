//! The auditing middleware layer.

use crate::config::{AuditConfig, AuditSettings};
use crate::dispatch::Dispatcher;
use crate::error::ConfigError;
use crate::filter::RedactionList;
use crate::record::{AuditRecord, RequestSnapshot, ResponseSnapshot};
use crate::tap::{tap_response, TapEnd};
use auditor_core::middleware::{BoxedNext, MiddlewareLayer, ResponseFuture};
use auditor_core::Request;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Middleware that audits every exchange passing through it.
///
/// The request is captured before the downstream handler runs, the response
/// while it streams to the client. Once the response body is done the record
/// is posted to the collector on a background task. The client and the
/// handler see exactly what they would without the layer.
///
/// # Example
///
/// ```ignore
/// use auditor::{AuditConfig, AuditLayer};
/// use auditor_core::{handler_fn, LayerStack, Server};
///
/// let audit = AuditLayer::new(
///     AuditConfig::new("http://collector:8080/audit").ignore_header("Authorization"),
/// )?;
///
/// let layers = LayerStack::new().with(audit);
/// Server::new(layers, handler_fn(|_req| async { "ok" }))
///     .run("0.0.0.0:3000")
///     .await?;
/// ```
#[derive(Clone)]
pub struct AuditLayer {
    inner: Arc<Inner>,
}

struct Inner {
    redaction: RedactionList,
    dispatcher: Dispatcher,
}

impl AuditLayer {
    /// Validate `config` and build the layer.
    pub fn new(config: AuditConfig) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        let dispatcher = Dispatcher::new(&settings)?;
        Ok(Self::assemble(&settings, dispatcher))
    }

    /// Build the layer from `AUDITOR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(AuditConfig::from_env()?)
    }

    /// Build the layer around a caller-supplied HTTP client.
    pub fn with_client(config: AuditConfig, client: reqwest::Client) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        let dispatcher = Dispatcher::with_client(client, &settings);
        Ok(Self::assemble(&settings, dispatcher))
    }

    fn assemble(settings: &AuditSettings, dispatcher: Dispatcher) -> Self {
        tracing::debug!(
            endpoint = %dispatcher.endpoint(),
            redacted = settings.redaction().names().len(),
            timeout_ms = settings.timeout().map(|t| t.as_millis() as u64),
            "Audit layer configured"
        );
        Self {
            inner: Arc::new(Inner {
                redaction: settings.redaction().clone(),
                dispatcher,
            }),
        }
    }

    pub fn redaction(&self) -> &RedactionList {
        &self.inner.redaction
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

impl MiddlewareLayer for AuditLayer {
    fn call(&self, mut req: Request, next: BoxedNext) -> ResponseFuture {
        let inner = self.inner.clone();

        Box::pin(async move {
            // Both clocks are read together; response time is `time` plus the
            // monotonic elapsed time.
            let started = Instant::now();
            let time = Utc::now();
            let request = RequestSnapshot::capture_at(&mut req, &inner.redaction, time).await;

            let response = next(req).await;

            tap_response(response, move |tapped| {
                let finished = offset(time, started.elapsed());
                if tapped.end == TapEnd::Abandoned {
                    tracing::debug!(
                        method = %request.method,
                        path = %request.path,
                        captured = tapped.body.len(),
                        "Response abandoned before completion"
                    );
                }
                let response = ResponseSnapshot::from_tap(tapped, &inner.redaction, finished);
                inner.dispatcher.dispatch(AuditRecord::new(request, response));
            })
        })
    }

    fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
        Box::new(self.clone())
    }
}

/// Wall-clock time `elapsed` after `start`, measured on the monotonic clock.
fn offset(start: DateTime<Utc>, elapsed: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(elapsed)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(start)
}
