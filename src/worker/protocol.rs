//! NDJSON messages exchanged with the query worker.
//!
//! ```text
//! → {"id": "<uuid>", "method": "dax.execute", "params": {"dataset_id": ..., "query": ...}}
//! ← {"id": "<uuid>", "success": true, "result": {"rows": [{...}]}}
//! ← {"id": "<uuid>", "success": false, "error": {"code": "QUERY_FAILED", "message": ...}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::WorkerError;
use crate::config::PowerBiSettings;
use crate::data::Record;

/// Method executing a DAX statement.
pub const EXECUTE_DAX: &str = "dax.execute";

/// Error codes the worker reports.
pub mod codes {
    pub const WORKER_EXITED: &str = "WORKER_EXITED";
    pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
    pub const QUERY_FAILED: &str = "QUERY_FAILED";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
}

/// One request line.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRequest {
    pub id: String,
    pub method: String,
    pub params: Value,
}

/// One response line, correlated to its request by `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerResponse {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<WorkerFault>,
}

/// Failure payload of an unsuccessful response.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerFault {
    pub code: String,
    pub message: String,
}

impl WorkerResponse {
    /// Synthetic failure for requests still pending when the worker goes away.
    pub(crate) fn exited(id: String) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(WorkerFault {
                code: codes::WORKER_EXITED.to_string(),
                message: "worker process exited before responding".to_string(),
            }),
        }
    }

    /// The result payload, or the classified failure.
    pub fn into_result(self) -> Result<Value, WorkerError> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        Err(match self.error {
            Some(fault) => WorkerError::from_code(&fault.code, fault.message),
            None => WorkerError::from_code("UNKNOWN", "worker reported failure without details"),
        })
    }
}

/// Parameters of [`EXECUTE_DAX`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteDaxParams {
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    pub query: String,
    /// The worker falls back to its own environment when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PowerBiSettings>,
}

/// Result of [`EXECUTE_DAX`]: rows keyed by the column names the service returns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteDaxResponse {
    #[serde(default)]
    pub rows: Vec<Record>,
}
