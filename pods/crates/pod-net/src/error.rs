use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodNetError {
    #[error("Could not reach {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("{service} returned status {status} ({reason})")]
    Status {
        service: &'static str,
        status: u16,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Lookup for {0} missing from batch response")]
    MissingFromBatch(String),
}

pub type PodNetResult<T> = Result<T, PodNetError>;

impl PodNetError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            PodNetError::Unreachable { .. } => true,
            PodNetError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            PodNetError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Message suitable for showing in place of the table
    pub fn user_message(&self) -> String {
        match self {
            PodNetError::Unreachable { url, .. } => {
                format!("Network Error: Could not reach {}.", url)
            }
            other => format!("Error: {}.", other),
        }
    }
}

// Implement a conversion from backoff::Error<PodNetError> to PodNetError
impl From<backoff::Error<PodNetError>> for PodNetError {
    fn from(err: backoff::Error<PodNetError>) -> Self {
        match err {
            backoff::Error::Permanent(e) => e,
            backoff::Error::Transient { err, .. } => err,
        }
    }
}

impl From<url::ParseError> for PodNetError {
    fn from(err: url::ParseError) -> Self {
        PodNetError::InvalidUrl(err.to_string())
    }
}

/// Classify a transport failure against `url`
pub fn map_reqwest_error(url: &str, err: reqwest::Error) -> PodNetError {
    if err.is_timeout() {
        PodNetError::Unreachable {
            url: url.to_string(),
            reason: "request timed out".to_string(),
        }
    } else if err.is_connect() {
        PodNetError::Unreachable {
            url: url.to_string(),
            reason: "connection error".to_string(),
        }
    } else {
        PodNetError::Request(err)
    }
}

/// Build a status error from a non-success response
pub fn status_error(service: &'static str, status: reqwest::StatusCode) -> PodNetError {
    PodNetError::Status {
        service,
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}
