//! Audit record data model and snapshot builders.
//!
//! A record pairs one [`RequestSnapshot`] with one [`ResponseSnapshot`] and
//! the elapsed time between them. Field names and nesting are the collector
//! wire format:
//!
//! ```text
//! {
//!   "request":  { "time", "headers", "body", "path", "query",
//!                 "raw_query", "method", "content_length" },
//!   "duration": <milliseconds>,
//!   "response": { "time", "body", "headers", "status" }
//! }
//! ```

use crate::filter::RedactionList;
use crate::headers::MultiMap;
use crate::tap::TappedResponse;
use auditor_core::body::{self, BoxError};
use auditor_core::{Body, Request};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::stream;
use http_body::Frame;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// What the interceptor saw of the inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub time: DateTime<Utc>,
    pub headers: MultiMap,
    #[serde(with = "lossy_body")]
    pub body: Bytes,
    pub path: String,
    pub query: MultiMap,
    pub raw_query: String,
    pub method: String,
    /// Length declared by the client, not the captured body length.
    pub content_length: i64,
}

/// What the client received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub time: DateTime<Utc>,
    #[serde(with = "lossy_body")]
    pub body: Bytes,
    pub headers: MultiMap,
    pub status: u16,
}

/// One request/response exchange, ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request: RequestSnapshot,
    /// Milliseconds between the two snapshot times.
    pub duration: i64,
    pub response: ResponseSnapshot,
}

impl AuditRecord {
    /// Pair two snapshots and compute the duration between them.
    pub fn new(request: RequestSnapshot, response: ResponseSnapshot) -> Self {
        let duration = (response.time - request.time).num_milliseconds().max(0);
        Self {
            request,
            duration,
            response,
        }
    }
}

impl RequestSnapshot {
    /// Snapshot the request, reading its whole body.
    ///
    /// The body is put back with the same bytes so the downstream handler
    /// reads exactly what the client sent. A body that fails part-way is put
    /// back as the bytes read so far followed by the same error; the snapshot
    /// keeps the partial bytes.
    pub async fn capture(req: &mut Request, redaction: &RedactionList) -> Self {
        Self::capture_at(req, redaction, Utc::now()).await
    }

    /// Like [`capture`](Self::capture), stamping the snapshot with `time`.
    ///
    /// The time is fixed before the body is read, so a slow upload does not
    /// move the request timestamp.
    pub async fn capture_at(
        req: &mut Request,
        redaction: &RedactionList,
        time: DateTime<Utc>,
    ) -> Self {
        let (captured, restored) = drain_body(req.take_body()).await;
        req.set_body(restored);

        let raw_query = req.query_string().unwrap_or_default().to_string();

        Self {
            time,
            headers: redaction.capture(req.headers()),
            body: captured,
            path: req.path().to_string(),
            query: parse_query(&raw_query),
            raw_query,
            method: req.method().to_string(),
            content_length: req.content_length(),
        }
    }
}

impl ResponseSnapshot {
    /// Snapshot a completed tap.
    pub fn from_tap(tapped: TappedResponse, redaction: &RedactionList, time: DateTime<Utc>) -> Self {
        Self {
            time,
            body: tapped.body,
            headers: redaction.capture(&tapped.headers),
            status: tapped.status.as_u16(),
        }
    }
}

/// Read a body to the end and build an equivalent replacement.
async fn drain_body(mut original: Body) -> (Bytes, Body) {
    let mut collected = BytesMut::new();
    let mut trailers = None;
    let mut failure: Option<BoxError> = None;

    while let Some(frame) = original.frame().await {
        match frame {
            Ok(frame) => match frame.into_data() {
                Ok(data) => collected.extend_from_slice(&data),
                Err(frame) => {
                    if let Ok(t) = frame.into_trailers() {
                        trailers = Some(t);
                    }
                }
            },
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let captured = collected.freeze();

    if trailers.is_none() && failure.is_none() {
        let restored = if captured.is_empty() {
            body::empty()
        } else {
            body::full(captured.clone())
        };
        return (captured, restored);
    }

    let mut frames: Vec<Result<Frame<Bytes>, BoxError>> = Vec::with_capacity(3);
    if !captured.is_empty() {
        frames.push(Ok(Frame::data(captured.clone())));
    }
    if let Some(trailers) = trailers {
        frames.push(Ok(Frame::trailers(trailers)));
    }
    if let Some(e) = failure {
        tracing::warn!(
            error = %e,
            captured = captured.len(),
            "Request body failed while being captured"
        );
        frames.push(Err(e));
    }

    (captured, body::from_stream(stream::iter(frames)))
}

/// Parse an `application/x-www-form-urlencoded` query string.
///
/// Keys without `=` map to an empty value. Pairs with a malformed escape
/// or a literal `;` are skipped. Escapes that decode to invalid UTF-8 are
/// kept with U+FFFD in their place.
pub fn parse_query(raw: &str) -> MultiMap {
    let mut query = MultiMap::new();
    for pair in raw.split('&') {
        if pair.is_empty() || pair.contains(';') {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let (Some(key), Some(value)) = (decode_component(key), decode_component(value)) {
            query.append(key, value);
        }
    }
    query
}

fn decode_component(component: &str) -> Option<String> {
    if !has_valid_escapes(component) {
        return None;
    }
    let spaced: Cow<'_, str> = if component.contains('+') {
        Cow::Owned(component.replace('+', " "))
    } else {
        Cow::Borrowed(component)
    };
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Every `%` must start a two-digit hex escape.
fn has_valid_escapes(component: &str) -> bool {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Bodies travel as strings; bytes that are not UTF-8 are replaced.
mod lossy_body {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        String::deserialize(deserializer).map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::TapEnd;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use std::time::Duration;

    fn request(uri: &str, body: Body) -> Request {
        let req = http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", "secret")
            .header("Content-Length", "5")
            .body(body)
            .unwrap();
        Request::from_http(req)
    }

    #[tokio::test]
    async fn test_capture_restores_body() {
        let mut req = request("/items?a=1&a=2&b", body::full("hello"));
        let snapshot = RequestSnapshot::capture(&mut req, &RedactionList::new(["authorization"])).await;

        assert_eq!(snapshot.body, Bytes::from_static(b"hello"));
        assert_eq!(snapshot.method, "POST");
        assert_eq!(snapshot.path, "/items");
        assert_eq!(snapshot.raw_query, "a=1&a=2&b");
        assert_eq!(snapshot.query.get("a").unwrap(), &["1".to_string(), "2".to_string()]);
        assert_eq!(snapshot.query.first("b"), Some(""));
        assert_eq!(snapshot.content_length, 5);
        assert!(!snapshot.headers.contains_key_ignore_case("authorization"));

        // The handler still reads the full body, and the header is untouched.
        assert_eq!(req.headers()["authorization"], "secret");
        let rest = req.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(rest, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_capture_at_keeps_time_across_slow_body() {
        let (tx, inner) = body::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send_data("late").await.ok();
        });
        let mut req = request("/", inner);

        let arrived = Utc::now();
        let snapshot =
            RequestSnapshot::capture_at(&mut req, &RedactionList::default(), arrived).await;
        assert_eq!(snapshot.time, arrived);
        assert_eq!(snapshot.body, Bytes::from_static(b"late"));
        assert!(Utc::now() - arrived >= chrono::Duration::milliseconds(50));
    }

    #[tokio::test]
    async fn test_capture_joins_chunks() {
        let frames = stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from_static(b"hel"))),
            Ok(Frame::data(Bytes::from_static(b"lo"))),
        ]);
        let mut req = request("/", body::from_stream(frames));

        let snapshot = RequestSnapshot::capture(&mut req, &RedactionList::default()).await;
        assert_eq!(snapshot.body, Bytes::from_static(b"hello"));
        assert_eq!(snapshot.raw_query, "");
        assert!(snapshot.query.is_empty());

        let rest = req.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(rest, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_capture_failing_body_replays_prefix_then_error() {
        let frames = stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from_static(b"par"))),
            Err(BoxError::from("connection reset")),
        ]);
        let mut req = request("/", body::from_stream(frames));

        let snapshot = RequestSnapshot::capture(&mut req, &RedactionList::default()).await;
        assert_eq!(snapshot.body, Bytes::from_static(b"par"));

        let mut restored = req.into_body();
        let first = restored.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"par"));
        let second = restored.frame().await.unwrap();
        assert_eq!(second.unwrap_err().to_string(), "connection reset");
    }

    #[tokio::test]
    async fn test_capture_keeps_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));
        let frames = stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from_static(b"data"))),
            Ok(Frame::trailers(trailers)),
        ]);
        let mut req = request("/", body::from_stream(frames));

        RequestSnapshot::capture(&mut req, &RedactionList::default()).await;

        let collected = req.into_body().collect().await.unwrap();
        assert_eq!(collected.trailers().unwrap()["x-checksum"], "abc");
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"data"));
    }

    #[test]
    fn test_parse_query_decoding() {
        let query = parse_query("q=hello+world&path=%2Fa%2Fb&&empty=&flag");
        assert_eq!(query.first("q"), Some("hello world"));
        assert_eq!(query.first("path"), Some("/a/b"));
        assert_eq!(query.first("empty"), Some(""));
        assert_eq!(query.first("flag"), Some(""));
        assert_eq!(query.len(), 4);
    }

    #[test]
    fn test_parse_query_skips_malformed_pairs() {
        let query = parse_query("bad=%zz&good=1&worse=%4&x=%E2%9C%93");
        assert!(!query.contains_key("bad"));
        assert!(!query.contains_key("worse"));
        assert_eq!(query.first("good"), Some("1"));
        assert_eq!(query.first("x"), Some("\u{2713}"));
    }

    #[test]
    fn test_parse_query_keeps_invalid_utf8_lossily() {
        let query = parse_query("x=%FF&y=1&%C3=v");
        assert_eq!(query.first("x"), Some("\u{fffd}"));
        assert_eq!(query.first("y"), Some("1"));
        assert_eq!(query.first("\u{fffd}"), Some("v"));
    }

    #[test]
    fn test_parse_query_skips_pairs_with_semicolon() {
        let query = parse_query("a=1;b=2&c=3&d;=4&e=%3B");
        assert!(!query.contains_key("a"));
        assert!(!query.contains_key("a=1;b"));
        assert!(!query.contains_key("d;"));
        assert_eq!(query.first("c"), Some("3"));
        // An escaped semicolon is data.
        assert_eq!(query.first("e"), Some(";"));
        assert_eq!(query.len(), 2);
    }

    #[test]
    fn test_response_snapshot_from_tap() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("set-cookie", HeaderValue::from_static("id=1"));
        let tapped = TappedResponse {
            status: StatusCode::CREATED,
            headers,
            body: Bytes::from_static(b"made"),
            end: TapEnd::Completed,
        };

        let now = Utc::now();
        let snapshot = ResponseSnapshot::from_tap(tapped, &RedactionList::new(["Set-Cookie"]), now);
        assert_eq!(snapshot.status, 201);
        assert_eq!(snapshot.time, now);
        assert_eq!(snapshot.body, Bytes::from_static(b"made"));
        assert_eq!(snapshot.headers.first("content-type"), Some("text/plain"));
        assert!(!snapshot.headers.contains_key("set-cookie"));
    }

    #[test]
    fn test_record_duration_in_millis() {
        let start = Utc::now();
        let request = RequestSnapshot {
            time: start,
            headers: MultiMap::new(),
            body: Bytes::new(),
            path: "/".into(),
            query: MultiMap::new(),
            raw_query: String::new(),
            method: "GET".into(),
            content_length: 0,
        };
        let response = ResponseSnapshot {
            time: start + chrono::Duration::from_std(Duration::from_millis(1250)).unwrap(),
            body: Bytes::new(),
            headers: MultiMap::new(),
            status: 200,
        };

        let record = AuditRecord::new(request, response);
        assert_eq!(record.duration, 1250);
    }
}
