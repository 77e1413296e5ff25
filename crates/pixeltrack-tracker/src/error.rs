use thiserror::Error;

/// Errors from the server delivery channel.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid server endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The endpoint answered 2xx but reported `"success": false`.
    #[error("server rejected event {event_id}: {reason}")]
    Rejected { event_id: String, reason: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from durable client storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is not a JSON object of strings: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by a [`crate::script::PixelScript`] implementation.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("tracking script is not loaded")]
    NotReady,

    #[error("tracking script injection failed: {0}")]
    Injection(String),

    #[error("tracking script call '{call}' failed: {reason}")]
    Call { call: String, reason: String },
}
