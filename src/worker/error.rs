//! Worker transport and remote errors.

use std::io;
use std::path::PathBuf;

use super::protocol::codes;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failures talking to, or reported by, the query worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to launch worker {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker settings are invalid: {0}")]
    Settings(String),

    #[error("failed to write request to worker: {0}")]
    Write(#[source] io::Error),

    #[error("failed to encode worker request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode worker result: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("worker did not answer within {0} seconds")]
    Timeout(u64),

    #[error("worker process exited before responding")]
    Exited,

    #[error("worker response channel closed")]
    ChannelClosed,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("DAX query failed: {0}")]
    Query(String),

    #[error("worker rejected the request: {0}")]
    InvalidRequest(String),

    #[error("worker does not support method: {0}")]
    MethodNotFound(String),

    #[error("worker error {code}: {message}")]
    Remote { code: String, message: String },
}

impl WorkerError {
    /// Map a worker error code onto a typed error.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            codes::WORKER_EXITED => WorkerError::Exited,
            codes::AUTHENTICATION_FAILED => WorkerError::Authentication(message),
            codes::QUERY_FAILED => WorkerError::Query(message),
            codes::INVALID_REQUEST => WorkerError::InvalidRequest(message),
            codes::METHOD_NOT_FOUND => WorkerError::MethodNotFound(message),
            _ => WorkerError::Remote {
                code: code.to_string(),
                message,
            },
        }
    }

    /// True when the worker can no longer answer.
    pub fn is_worker_gone(&self) -> bool {
        matches!(self, WorkerError::Exited | WorkerError::ChannelClosed)
    }
}
