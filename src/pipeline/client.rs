//! Execution client abstraction.
//!
//! The `ExecutionClient` trait abstracts over how compiled DAX reaches a
//! dataset. The default implementation forwards statements to the query
//! worker; tests and embedding code supply their own.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::config::{PowerBiSettings, Settings};
use crate::data::{materialize_rows, Dataset};
use crate::dax::DaxQueryPlan;
use crate::model::MatrixVisual;
use crate::template::FieldReference;
use crate::worker::WorkerClient;

/// Opaque error raised by an execution client.
pub type ExecutionError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a client needs to execute one matrix query.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub visual: &'a MatrixVisual,
    pub row_fields: &'a [FieldReference],
    pub plan: &'a DaxQueryPlan,
    pub dataset_id: &'a str,
    pub workspace_id: Option<&'a str>,
    pub credentials: Option<&'a PowerBiSettings>,
}

/// Executes compiled matrix queries against a dataset.
///
/// Concurrency, timeouts and retries are the client's concern.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn execute_matrix(&self, request: ExecutionRequest<'_>) -> Result<Dataset, ExecutionError>;
}

/// A dataset that is either available now or still being fetched.
pub enum Acquisition<'a> {
    Ready(Dataset),
    Pending(BoxFuture<'a, Result<Dataset, ExecutionError>>),
}

impl std::fmt::Debug for Acquisition<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Acquisition::Ready(dataset) => f.debug_tuple("Ready").field(&dataset.len()).finish(),
            Acquisition::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// ExecutionClient backed by the query worker process.
///
/// A worker is spawned per execution and shut down when the request
/// completes.
#[derive(Debug, Clone, Default)]
pub struct WorkerExecutionClient {
    settings: Arc<Settings>,
}

impl WorkerExecutionClient {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

#[async_trait]
impl ExecutionClient for WorkerExecutionClient {
    async fn execute_matrix(&self, request: ExecutionRequest<'_>) -> Result<Dataset, ExecutionError> {
        let client = WorkerClient::spawn_with_settings(&self.settings).await?;
        tracing::debug!(
            dataset_id = request.dataset_id,
            workspace_id = request.workspace_id,
            "executing DAX via worker"
        );
        let response = client
            .execute_dax(
                request.dataset_id,
                request.workspace_id,
                &request.plan.statement,
                request.credentials,
            )
            .await?;
        tracing::debug!(rows = response.rows.len(), "worker returned rows");

        Ok(materialize_rows(request.visual, request.row_fields, response.rows))
    }
}
