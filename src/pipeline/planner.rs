//! Matrix query planners.
//!
//! A planner compiles a matrix visual into a [`DaxQueryPlan`] and acquires
//! the dataset the plan describes. Dataset acquisition is selected in
//! priority order:
//!
//! 1. an explicit dataset id on the run options goes straight to the
//!    execution client
//! 2. a provider key (`mock` or a registered provider)
//! 3. the datasource named by the options, the visual or the defaults

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::client::{Acquisition, ExecutionClient, ExecutionError, ExecutionRequest};
use super::options::ExecutionContext;
use super::PipelineError;
use crate::data::{mock_matrix_data, Dataset};
use crate::datasource::{
    resolve_datasource, DataSourceError, ResolvedDataSource, MOCK_DATASOURCE,
};
use crate::dax::{compile_matrix, DaxQueryPlan};
use crate::model::MatrixVisual;
use crate::template::{extract_field_references, FieldReference};

/// Plan and dataset produced for one matrix.
#[derive(Debug, Clone)]
pub struct MatrixPlannerResult {
    pub plan: DaxQueryPlan,
    pub dataset: Dataset,
}

/// Compiles and acquires data for matrix visuals.
pub trait MatrixQueryPlanner: Send + Sync {
    fn plan(
        &self,
        visual: &MatrixVisual,
        context: &ExecutionContext,
    ) -> Result<MatrixPlannerResult, PipelineError>;
}

/// Produces a dataset for a compiled matrix without a remote call.
pub type MatrixDataProvider = Arc<
    dyn Fn(&MatrixVisual, &[FieldReference], &DaxQueryPlan) -> Result<Dataset, ExecutionError>
        + Send
        + Sync,
>;

/// Resolves a datasource reference relative to the visual's document.
pub type DatasourceResolver = Arc<
    dyn Fn(Option<&str>, &Path) -> Result<ResolvedDataSource, DataSourceError> + Send + Sync,
>;

/// Drive a dataset acquisition to completion.
///
/// Pending acquisitions run on a private current-thread runtime; calling
/// this from inside a running runtime is an error.
pub fn complete_acquisition(acquisition: Acquisition<'_>) -> Result<Dataset, PipelineError> {
    match acquisition {
        Acquisition::Ready(dataset) => Ok(dataset),
        Acquisition::Pending(future) => {
            if tokio::runtime::Handle::try_current().is_ok() {
                return Err(PipelineError::AsyncContext);
            }
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|err| PipelineError::Execution(Box::new(err)))?;
            runtime.block_on(future).map_err(PipelineError::Execution)
        }
    }
}

fn row_fields(visual: &MatrixVisual) -> Result<Vec<FieldReference>, PipelineError> {
    Ok(extract_field_references(visual.row_templates())?)
}

// ============================================================================
// Function planner
// ============================================================================

/// Planner that compiles DAX and delegates data to a provider function.
#[derive(Clone)]
pub struct FunctionMatrixPlanner {
    provider: MatrixDataProvider,
}

impl FunctionMatrixPlanner {
    pub fn new(provider: MatrixDataProvider) -> Self {
        Self { provider }
    }

    /// Planner backed by deterministic mock data.
    pub fn mock() -> Self {
        Self::new(Arc::new(
            |visual: &MatrixVisual,
             row_fields: &[FieldReference],
             _plan: &DaxQueryPlan|
             -> Result<Dataset, ExecutionError> { Ok(mock_matrix_data(visual, row_fields)) },
        ))
    }
}

impl fmt::Debug for FunctionMatrixPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionMatrixPlanner").finish_non_exhaustive()
    }
}

impl MatrixQueryPlanner for FunctionMatrixPlanner {
    fn plan(
        &self,
        visual: &MatrixVisual,
        _context: &ExecutionContext,
    ) -> Result<MatrixPlannerResult, PipelineError> {
        let row_fields = row_fields(visual)?;
        let plan = compile_matrix(visual, &row_fields);
        let dataset = (self.provider)(visual, &row_fields, &plan).map_err(PipelineError::Execution)?;
        Ok(MatrixPlannerResult { plan, dataset })
    }
}

// ============================================================================
// DAX planner
// ============================================================================

/// Planner that executes compiled DAX through an [`ExecutionClient`].
#[derive(Clone)]
pub struct DaxMatrixPlanner {
    client: Arc<dyn ExecutionClient>,
    providers: HashMap<String, MatrixDataProvider>,
    resolver: DatasourceResolver,
}

impl DaxMatrixPlanner {
    pub fn new(client: Arc<dyn ExecutionClient>) -> Self {
        Self {
            client,
            providers: HashMap::new(),
            resolver: Arc::new(resolve_datasource),
        }
    }

    /// Register a provider selectable by key. Keys are case-insensitive.
    pub fn with_provider(mut self, key: impl Into<String>, provider: MatrixDataProvider) -> Self {
        self.providers
            .insert(key.into().trim().to_lowercase(), provider);
        self
    }

    /// Replace the datasource resolver.
    pub fn with_resolver(mut self, resolver: DatasourceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    fn acquire<'a>(
        &'a self,
        visual: &'a MatrixVisual,
        row_fields: &'a [FieldReference],
        plan: &'a DaxQueryPlan,
        context: &'a ExecutionContext,
        datasource: &'a mut Option<ResolvedDataSource>,
    ) -> Result<Acquisition<'a>, PipelineError> {
        let data = &context.options.data;

        if let Some(dataset_id) = data.dataset_id.as_deref().filter(|id| !id.trim().is_empty()) {
            tracing::debug!(dataset_id, "executing against explicit dataset");
            let request = ExecutionRequest {
                visual,
                row_fields,
                plan,
                dataset_id,
                workspace_id: data.workspace_id.as_deref(),
                credentials: None,
            };
            return Ok(Acquisition::Pending(self.client.execute_matrix(request)));
        }

        if let Some(key) = context.provider_key() {
            if key == MOCK_DATASOURCE {
                return Ok(Acquisition::Ready(mock_matrix_data(visual, row_fields)));
            }
            let provider = self
                .providers
                .get(&key)
                .ok_or(DataSourceError::UnknownProvider(key))?;
            let dataset = provider(visual, row_fields, plan).map_err(PipelineError::Execution)?;
            return Ok(Acquisition::Ready(dataset));
        }

        let reference = data
            .datasource_override
            .as_deref()
            .or_else(|| visual.datasource())
            .or(data.default_datasource.as_deref())
            .map(str::trim)
            .filter(|reference| !reference.is_empty());

        let resolved = match (reference, context.config_path.as_deref()) {
            (None, _) => ResolvedDataSource::mock(),
            (Some(reference), Some(config_path)) => (self.resolver)(Some(reference), config_path)?,
            (Some(reference), None) if reference.eq_ignore_ascii_case(MOCK_DATASOURCE) => {
                ResolvedDataSource::mock()
            }
            (Some(reference), None) => {
                return Err(DataSourceError::MissingConfigPath {
                    reference: reference.to_string(),
                }
                .into());
            }
        };

        if resolved.is_mock() {
            *datasource = Some(resolved);
            return Ok(Acquisition::Ready(mock_matrix_data(visual, row_fields)));
        }
        if resolved.dataset_id.is_none() {
            return Err(DataSourceError::MissingDatasetId {
                name: resolved.name,
            }
            .into());
        }

        let resolved: &'a ResolvedDataSource = datasource.insert(resolved);
        tracing::debug!(datasource = %resolved.name, "executing against datasource");
        let request = ExecutionRequest {
            visual,
            row_fields,
            plan,
            dataset_id: resolved.dataset_id.as_deref().unwrap_or_default(),
            workspace_id: data
                .workspace_id
                .as_deref()
                .or(resolved.workspace_id.as_deref()),
            credentials: resolved.settings.as_ref(),
        };
        Ok(Acquisition::Pending(self.client.execute_matrix(request)))
    }
}

impl fmt::Debug for DaxMatrixPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.providers.keys().collect();
        keys.sort();
        f.debug_struct("DaxMatrixPlanner")
            .field("providers", &keys)
            .finish_non_exhaustive()
    }
}

impl MatrixQueryPlanner for DaxMatrixPlanner {
    fn plan(
        &self,
        visual: &MatrixVisual,
        context: &ExecutionContext,
    ) -> Result<MatrixPlannerResult, PipelineError> {
        let row_fields = row_fields(visual)?;
        let plan = compile_matrix(visual, &row_fields);

        let mut datasource = None;
        let acquisition = self.acquire(visual, &row_fields, &plan, context, &mut datasource)?;
        let dataset = complete_acquisition(acquisition)?;

        Ok(MatrixPlannerResult { plan, dataset })
    }
}
