use reqwest::StatusCode;

/// Failures reported by a vision or image-edit backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("backend request timed out")]
    Timeout,
    #[error("backend transport failure: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("backend reply was empty: {0}")]
    EmptyReply(String),
}

impl BackendError {
    /// Timeouts and transport failures, as opposed to a reply the backend chose to send.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout | BackendError::Transport(_))
    }

    pub fn from_reqwest(err: &reqwest::Error, redact: impl Fn(&str) -> String) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Transport(redact(&err.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required fields in audit response: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("Invalid audit field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("image size ({:.2} MB) exceeds maximum allowed size ({:.2} MB)", mb(.size), mb(.limit))]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to parse structured reply: {0}")]
    Parse(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn mb(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

pub type PipelineResult<T> = Result<T, PipelineError>;
