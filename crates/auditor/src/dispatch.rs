//! Background delivery of audit records.
//!
//! Each record is sent as one `POST` with a JSON body. Delivery is best
//! effort: no retries, no queue. A failure is logged and the record is gone.

use crate::codec;
use crate::config::AuditSettings;
use crate::error::{ConfigError, DeliveryError, DeliveryResult};
use crate::record::AuditRecord;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Sends records to the collector endpoint.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    endpoint: Url,
    timeout: Option<Duration>,
}

impl Dispatcher {
    /// Build a dispatcher for validated settings.
    pub fn new(settings: &AuditSettings) -> Result<Self, ConfigError> {
        let client = Client::builder().build().map_err(ConfigError::Client)?;
        Ok(Self::with_client(client, settings))
    }

    /// Build a dispatcher around an existing client.
    pub fn with_client(client: Client, settings: &AuditSettings) -> Self {
        Self {
            client,
            endpoint: settings.endpoint().clone(),
            timeout: settings.timeout(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one record and wait for the collector's answer.
    ///
    /// Any 2xx status is success.
    pub async fn deliver(&self, record: &AuditRecord) -> DeliveryResult {
        let body = codec::encode(record)?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    /// Deliver a record on a detached task and return immediately.
    ///
    /// Failures are logged, never returned to the caller. The handle can be
    /// awaited to observe the outcome. Without a tokio runtime the record is
    /// dropped and `None` is returned.
    pub fn dispatch(&self, record: AuditRecord) -> Option<JoinHandle<DeliveryResult>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    error = %DeliveryError::NoRuntime,
                    method = %record.request.method,
                    path = %record.request.path,
                    "Dropping audit record"
                );
                return None;
            }
        };

        let dispatcher = self.clone();
        Some(handle.spawn(async move {
            let result = dispatcher.deliver(&record).await;
            match &result {
                Ok(()) => tracing::debug!(
                    endpoint = %dispatcher.endpoint,
                    method = %record.request.method,
                    path = %record.request.path,
                    status = record.response.status,
                    duration_ms = record.duration,
                    "Audit record delivered"
                ),
                Err(e) => tracing::warn!(
                    endpoint = %dispatcher.endpoint,
                    method = %record.request.method,
                    path = %record.request.path,
                    timeout = e.is_timeout(),
                    error = %e,
                    "Failed to deliver audit record"
                ),
            }
            result
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::headers::MultiMap;
    use crate::record::{RequestSnapshot, ResponseSnapshot};
    use auditor_testing::{MockResponse, MockServer, RequestMatcher};
    use bytes::Bytes;
    use chrono::Utc;
    use http::{Method, StatusCode};
    use serde_json::json;

    fn record() -> AuditRecord {
        let now = Utc::now();
        AuditRecord::new(
            RequestSnapshot {
                time: now,
                headers: MultiMap::new(),
                body: Bytes::new(),
                path: "/status".into(),
                query: MultiMap::new(),
                raw_query: String::new(),
                method: "GET".into(),
                content_length: 0,
            },
            ResponseSnapshot {
                time: now,
                body: Bytes::from_static(b"ok"),
                headers: MultiMap::new(),
                status: 200,
            },
        )
    }

    fn dispatcher(url: &str, timeout: &str) -> Dispatcher {
        let settings = AuditConfig::new(url).timeout(timeout).validate().unwrap();
        Dispatcher::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_deliver_posts_json() {
        let server = MockServer::start().await;
        server
            .expect(
                RequestMatcher::new()
                    .method(Method::POST)
                    .path("/audit")
                    .header("content-type", "application/json")
                    .json_field("/request/path", json!("/status")),
            )
            .respond_with(MockResponse::new().status(StatusCode::OK))
            .times(1);

        dispatcher(&server.url("/audit"), "5s")
            .deliver(&record())
            .await
            .unwrap();

        server.verify();
    }

    #[tokio::test]
    async fn test_any_2xx_is_success() {
        let server = MockServer::start().await;
        server
            .expect(RequestMatcher::new())
            .respond_with(MockResponse::new().status(StatusCode::NO_CONTENT))
            .any_times();

        assert!(dispatcher(&server.base_url(), "5s")
            .deliver(&record())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_non_success_is_rejected() {
        let server = MockServer::start().await;
        server
            .expect(RequestMatcher::new())
            .respond_with(MockResponse::new().status(StatusCode::SERVICE_UNAVAILABLE))
            .any_times();

        let err = dispatcher(&server.base_url(), "5s")
            .deliver(&record())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 503 }));
    }

    #[tokio::test]
    async fn test_slow_collector_times_out() {
        let server = MockServer::start().await;
        server
            .expect(RequestMatcher::new())
            .respond_with(MockResponse::new().delay(Duration::from_secs(2)))
            .any_times();

        let err = dispatcher(&server.base_url(), "100ms")
            .deliver(&record())
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected a timeout, got {err}");
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = dispatcher(&format!("http://{addr}/audit"), "1s")
            .deliver(&record())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Network(_)));
    }

    #[tokio::test]
    async fn test_dispatch_returns_handle() {
        let server = MockServer::start().await;
        server
            .expect(RequestMatcher::new())
            .respond_with(MockResponse::new())
            .times(1);

        let handle = dispatcher(&server.base_url(), "5s")
            .dispatch(record())
            .expect("runtime is available");
        handle.await.unwrap().unwrap();

        server.verify();
    }

    #[test]
    fn test_dispatch_without_runtime_drops_record() {
        let d = dispatcher("http://127.0.0.1:9/audit", "1s");
        assert!(d.dispatch(record()).is_none());
    }
}
