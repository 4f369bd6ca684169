//! Error types for the index pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("upstream request for '{collection}' failed with status {status}")]
    UpstreamUnavailable { collection: String, status: u16 },

    #[error("upstream request for '{collection}' timed out after {timeout_ms}ms")]
    UpstreamTimeout { collection: String, timeout_ms: u64 },

    #[error("malformed upstream data for '{collection}': {detail}")]
    MalformedUpstreamData { collection: String, detail: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IndexError {
    /// Get error code for wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            IndexError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            IndexError::MalformedUpstreamData { .. } => "MALFORMED_UPSTREAM_DATA",
            IndexError::NotFound(_) => "NOT_FOUND",
            IndexError::ValidationRejected(_) => "VALIDATION_REJECTED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this error maps to on the read surface.
    pub fn http_status(&self) -> u16 {
        match self {
            IndexError::UpstreamUnavailable { .. } => 502,
            IndexError::UpstreamTimeout { .. } => 504,
            IndexError::MalformedUpstreamData { .. } => 502,
            IndexError::NotFound(_) => 404,
            IndexError::ValidationRejected(_) => 400,
            _ => 500,
        }
    }
}
