use thiserror::Error;

/// Fallback message used when a non-2xx response carries no `message` field.
pub const DEFAULT_API_ERROR_MESSAGE: &str = "Request failed";

/// Failures talking to the remote backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// The request never produced a response (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("no auth token available")]
    NotAuthenticated,
}

impl ApiError {
    /// Everything except a missing token is recoverable by queueing for a later sync pass.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ApiError::NotAuthenticated)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("failed to serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for StorageError {
    fn from(err: anyhow::Error) -> Self {
        StorageError::Backend(format!("{err:#}"))
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a workout session is already active ({session_id})")]
    AlreadyActive { session_id: String },

    #[error("a workout session is already being started")]
    StartInProgress,

    #[error("no active workout session")]
    NoActiveSession,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_not_transient() {
        assert!(!ApiError::NotAuthenticated.is_transient());
        assert!(ApiError::Network("refused".into()).is_transient());
        assert!(ApiError::Status {
            status: 500,
            message: DEFAULT_API_ERROR_MESSAGE.into(),
        }
        .is_transient());
    }

    #[test]
    fn anyhow_errors_keep_their_context_chain() {
        let err = anyhow::anyhow!("disk full").context("failed to write kv entry");
        let storage: StorageError = err.into();
        assert_eq!(
            storage.to_string(),
            "storage backend failure: failed to write kv entry: disk full"
        );
    }
}
