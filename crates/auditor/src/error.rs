//! Error types
//!
//! Construction problems are [`ConfigError`]s and stop the interceptor from
//! being built. Everything that can go wrong while shipping a record is a
//! [`DeliveryError`]; those never leave the background delivery task.

/// Fatal errors raised while building the interceptor.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No collector endpoint was configured.
    #[error("no remote server supplied")]
    MissingRemoteServer,

    /// The collector endpoint is not an absolute http(s) URL.
    #[error("invalid remote server '{url}': {reason}")]
    InvalidRemoteServer { url: String, reason: String },

    /// The timeout is not a valid duration string.
    #[error("invalid timeout '{value}': {reason}")]
    InvalidTimeout { value: String, reason: String },

    /// The HTTP client used for delivery could not be built.
    #[error("failed to build delivery client: {0}")]
    Client(#[source] reqwest::Error),

    /// Environment variables could not be deserialized.
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),

    /// A `.env` file could not be read.
    #[error("failed to load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

/// Per-record delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The record could not be encoded.
    #[error("failed to encode audit record: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Connecting to or talking with the collector failed, timeouts included.
    #[error("remote request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("remote server rejected audit record with status {status}")]
    Rejected { status: u16 },

    /// There was no async runtime to run the delivery on.
    #[error("no async runtime available for delivery")]
    NoRuntime,
}

impl DeliveryError {
    /// Whether the failure was the delivery timeout expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeliveryError::Network(e) if e.is_timeout())
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network(err)
    }
}

/// Result type for delivery operations.
pub type DeliveryResult<T = ()> = Result<T, DeliveryError>;
