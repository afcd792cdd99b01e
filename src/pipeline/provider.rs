//! Planner registry keyed by visual type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::client::{ExecutionClient, WorkerExecutionClient};
use super::planner::{DaxMatrixPlanner, FunctionMatrixPlanner, MatrixQueryPlanner};
use super::PipelineError;
use crate::config::Settings;
use crate::model::MATRIX;

/// Maps visual types to their query planners.
///
/// Built once; lookups never mutate the registry.
#[derive(Clone, Default)]
pub struct PlannerProvider {
    planners: HashMap<String, Arc<dyn MatrixQueryPlanner>>,
}

impl PlannerProvider {
    pub fn new<I, K>(planners: I) -> Self
    where
        I: IntoIterator<Item = (K, Arc<dyn MatrixQueryPlanner>)>,
        K: Into<String>,
    {
        Self {
            planners: planners
                .into_iter()
                .map(|(key, planner)| (key.into().to_lowercase(), planner))
                .collect(),
        }
    }

    /// Registry with a mock-backed matrix planner.
    pub fn mock() -> Self {
        let planner: Arc<dyn MatrixQueryPlanner> = Arc::new(FunctionMatrixPlanner::mock());
        Self::new([(MATRIX, planner)])
    }

    /// Registry whose matrix planner executes through `client`.
    pub fn with_client(client: Arc<dyn ExecutionClient>) -> Self {
        let planner: Arc<dyn MatrixQueryPlanner> = Arc::new(DaxMatrixPlanner::new(client));
        Self::new([(MATRIX, planner)])
    }

    /// Registry whose matrix planner executes through the query worker.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_client(Arc::new(WorkerExecutionClient::new(settings.clone())))
    }

    pub fn resolve(&self, visual_type: &str) -> Result<&Arc<dyn MatrixQueryPlanner>, PipelineError> {
        self.planners
            .get(&visual_type.to_lowercase())
            .ok_or_else(|| PipelineError::UnregisteredPlanner {
                visual_type: visual_type.to_string(),
            })
    }

    pub fn contains(&self, visual_type: &str) -> bool {
        self.planners.contains_key(&visual_type.to_lowercase())
    }
}

impl fmt::Debug for PlannerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.planners.keys().collect();
        keys.sort();
        f.debug_struct("PlannerProvider").field("planners", &keys).finish()
    }
}
