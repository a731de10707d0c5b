//! Error types for the CoinWatch synchronization layer

use thiserror::Error;

/// Errors raised by a single fetch through the resilient client
///
/// All variants are recoverable; the polling controller converts them into
/// published state instead of propagating them to presentation code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network unreachable, connection reset, or a relay/CORS rejection
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response body was not the JSON shape we expected
    #[error("Decode error: {0}")]
    Decode(String),

    /// A single attempt ran past its time budget
    #[error("Request timeout")]
    Timeout,

    /// The whole direct-then-relay sequence ran past its budget
    #[error("Refresh deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: usize },

    /// Direct route and every relay in the chain failed
    #[error("All proxy attempts exhausted after {attempts} attempts: {last_error}")]
    AllProxiesExhausted { attempts: usize, last_error: String },

    /// The underlying HTTP client could not be constructed
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl FetchError {
    /// Creates a Transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a Decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates an HttpStatus error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Errors from the durable snapshot / preferences storage
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored payload could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced by the polling controller's manual refresh
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// First-ever fetch failed and there is nothing cached to show
    #[error("{message}")]
    EmptyCacheOnFailure { message: String, source: FetchError },

    /// Refresh failed; the previous snapshot is still being served
    #[error("Refresh failed, previous snapshot retained: {0}")]
    Fetch(#[from] FetchError),

    /// The controller was stopped before the result could be applied
    #[error("Controller stopped")]
    Stopped,
}

impl SyncError {
    /// Creates an EmptyCacheOnFailure error
    pub fn empty_cache(message: impl Into<String>, source: FetchError) -> Self {
        Self::EmptyCacheOnFailure {
            message: message.into(),
            source,
        }
    }

    /// The underlying network failure, if any
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            SyncError::EmptyCacheOnFailure { source, .. } => Some(source),
            SyncError::Fetch(e) => Some(e),
            SyncError::Stopped => None,
        }
    }
}
