//! Visual execution pipeline.
//!
//! A [`Pipeline`] takes a resolved [`Visual`](crate::model::Visual) through
//! planner resolution, query planning, dataset acquisition, invariant
//! checks, rendering and output emission. Frames recurse into their matrix
//! children in declared order.
//!
//! ```text
//! PlannerResolution → QueryPlanning → DatasetAcquisition
//!     → InvariantChecking → Rendering → OutputEmission
//! ```

mod client;
mod executor;
mod options;
mod outputs;
mod planner;
mod provider;

pub use client::{
    Acquisition, ExecutionClient, ExecutionError, ExecutionRequest, WorkerExecutionClient,
};
pub use executor::{child_case_key, slugify, Pipeline, VisualExecutionResult};
pub use options::{ExecutionContext, PipelineDataOptions, PipelineOptions};
pub use outputs::{
    emit_outputs, EmissionReport, OutputEmissionError, OutputKind, OutputTarget,
    PipelineOutputArtifact,
};
pub use planner::{
    complete_acquisition, DatasourceResolver, DaxMatrixPlanner, FunctionMatrixPlanner,
    MatrixDataProvider, MatrixPlannerResult, MatrixQueryPlanner,
};
pub use provider::PlannerProvider;

use std::fmt;

use crate::datasource::DataSourceError;
use crate::render::RenderError;
use crate::template::TemplateError;

// ============================================================================
// Stages
// ============================================================================

/// Pipeline stage a visual is in, used for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    PlannerResolution,
    QueryPlanning,
    DatasetAcquisition,
    InvariantChecking,
    Rendering,
    OutputEmission,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::PlannerResolution => "planner_resolution",
            PipelineStage::QueryPlanning => "query_planning",
            PipelineStage::DatasetAcquisition => "dataset_acquisition",
            PipelineStage::InvariantChecking => "invariant_checking",
            PipelineStage::Rendering => "rendering",
            PipelineStage::OutputEmission => "output_emission",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort a visual's execution.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No query planner registered for visual type '{visual_type}'")]
    UnregisteredPlanner { visual_type: String },

    #[error("Invalid row template: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error("Query execution failed: {0}")]
    Execution(#[source] ExecutionError),

    #[error(
        "Dataset acquisition returned a pending result inside an active async runtime; \
         execute the pipeline from synchronous code"
    )]
    AsyncContext,

    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Frame child {index} is a {visual_type} visual; frames only support matrix children")]
    UnsupportedChild {
        index: usize,
        visual_type: &'static str,
    },
}

impl PipelineError {
    /// The stage this error was raised in.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::UnregisteredPlanner { .. } | PipelineError::UnsupportedChild { .. } => {
                PipelineStage::PlannerResolution
            }
            PipelineError::Template(_) => PipelineStage::QueryPlanning,
            PipelineError::DataSource(_)
            | PipelineError::Execution(_)
            | PipelineError::AsyncContext => PipelineStage::DatasetAcquisition,
            PipelineError::InvariantViolation { .. } => PipelineStage::InvariantChecking,
            PipelineError::Render(_) => PipelineStage::Rendering,
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        PipelineError::InvariantViolation {
            message: message.into(),
        }
    }
}
