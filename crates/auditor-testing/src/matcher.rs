use http::{HeaderMap, Method};
use serde_json::Value;

/// Matcher for HTTP requests
///
/// All configured criteria must hold for a request to match.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    pub(crate) method: Option<Method>,
    pub(crate) path: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body_json: Option<Value>,
    pub(crate) json_fields: Vec<(String, Value)>,
}

impl RequestMatcher {
    /// Create a matcher that accepts every request
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a specific HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Match a specific path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Match a header value; the name is case-insensitive, the value is not
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Match an exact JSON body
    pub fn body_json(mut self, body: Value) -> Self {
        self.body_json = Some(body);
        self
    }

    /// Match one field of a JSON body, addressed by JSON pointer (`/request/method`)
    pub fn json_field(mut self, pointer: impl Into<String>, value: Value) -> Self {
        self.json_fields.push((pointer.into(), value));
        self
    }

    /// Check if the matcher matches a request
    pub fn matches(&self, method: &Method, path: &str, headers: &HeaderMap, body: &[u8]) -> bool {
        if let Some(m) = &self.method {
            if m != method {
                return false;
            }
        }

        if let Some(p) = &self.path {
            if p != path {
                return false;
            }
        }

        for (k, v) in &self.headers {
            match headers.get(k.as_str()) {
                Some(val) if val == v.as_str() => {}
                _ => return false,
            }
        }

        if self.body_json.is_none() && self.json_fields.is_empty() {
            return true;
        }

        let actual: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => return false,
        };

        if let Some(expected) = &self.body_json {
            if &actual != expected {
                return false;
            }
        }

        self.json_fields
            .iter()
            .all(|(pointer, expected)| actual.pointer(pointer) == Some(expected))
    }
}
