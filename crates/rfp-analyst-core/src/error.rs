use std::path::PathBuf;

use serde::Deserialize;

/// Errors produced while talking to the analysis backend or preparing a request for it.
///
/// The UI never distinguishes between these; every variant collapses to its
/// `Display` string in an alert or an inline chat message.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Could not access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    InvalidFile(String),

    #[error("Request task failed: {0}")]
    Task(String),
}

/// FastAPI reports failures as `{"detail": ...}`
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl BackendError {
    /// Build an error from a non-success response, preferring the backend's `detail` message.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { detail: serde_json::Value::String(detail) }) => detail,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) if body.trim().is_empty() => format!("Request failed with status {}", status),
            Err(_) => format!("Request failed with status {}: {}", status, body.trim()),
        };

        BackendError::Status {
            status: status.as_u16(),
            message,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackendError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Guard violations raised by session transitions. These never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Upload an RFP PDF before asking questions")]
    NotUploaded,

    #[error("A request is already in progress")]
    Busy,

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("No draft is awaiting approval")]
    NothingPending,

    #[error("A document has already been uploaded")]
    AlreadyUploaded,
}
