use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Game directory could not be located: {0}")]
    TargetNotFound(String),
    #[error("Insufficient disk space: need {required} bytes, {available} available")]
    InsufficientSpace { required: u64, available: u64 },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Server returned {status} for {url}")]
    Http { status: u16, url: String },
    #[error("Integrity check failed for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Download cancelled")]
    Cancelled,
    #[error("Embedded installer failed: {0}")]
    DelegatedInstaller(String),
    #[error("No translation installed for {0}")]
    NotInstalled(String),
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether the download retry loop may attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Network(source) => source
                .status()
                .map_or(true, |status| status.is_server_error() || status.as_u16() == 429),
            EngineError::Http { status, .. } => *status >= 500 || *status == 429,
            EngineError::Io(source) => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// An unresolved target means the caller should prompt for a directory
    /// instead of just showing the message.
    pub fn needs_manual_selection(&self) -> bool {
        matches!(self, EngineError::TargetNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retryable() {
        let err = EngineError::Http {
            status: 404,
            url: "http://example.com/pack.zip".to_string(),
        };
        assert!(!err.is_retryable());

        let err = EngineError::Http {
            status: 503,
            url: "http://example.com/pack.zip".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn cancellation_is_terminal() {
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn missing_target_requests_manual_selection() {
        let err = EngineError::TargetNotFound("some-game".to_string());
        assert!(err.needs_manual_selection());
        assert!(!EngineError::Cancelled.needs_manual_selection());
    }
}
