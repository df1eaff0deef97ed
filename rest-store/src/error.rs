use http::StatusCode;
use thiserror::Error;

/// Failure to obtain a response from the backend at all.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request canceled")]
    Canceled,

    #[error("Watch stream error: {0}")]
    Stream(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Object already exists: {key}")]
    AlreadyExists { key: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Update conflict on {key}: gave up after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    #[error("Operation canceled")]
    Canceled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Unexpected status {status} from backend: {message}")]
    UnexpectedStatus { status: StatusCode, message: String },

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Errors raised by caller-supplied code, returned untouched
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<TransportError> for StoreError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Canceled => StoreError::Canceled,
            TransportError::Timeout => StoreError::DeadlineExceeded,
            other => StoreError::Transport(other),
        }
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
