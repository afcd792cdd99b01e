//! # Praeparo
//!
//! Declarative matrix and frame visuals compiled to DAX queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                YAML visual documents                     │
//! │   (compose chains, parameters, matrix / frame schema)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [loader]
//! ┌─────────────────────────────────────────────────────────┐
//! │            Visual (validated, immutable)                 │
//! │    MatrixVisual | FrameVisual { children: [Visual] }     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [pipeline → dax]
//! ┌─────────────────────────────────────────────────────────┐
//! │        DaxQueryPlan + Dataset (mock or worker)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [render]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Figure → HTML / PNG outputs                 │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod data;
pub mod datasource;
pub mod dax;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod template;
pub mod validation;
pub mod worker;

pub use loader::{LoadError, LoadedVisual, VisualLoader};
pub use model::Visual;
pub use pipeline::{ExecutionContext, Pipeline, PipelineError, PipelineOptions, PlannerProvider};

/// Top-level error for callers driving the whole flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Template(#[from] template::TemplateError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Settings(#[from] config::SettingsError),

    #[error(transparent)]
    DataSource(#[from] datasource::DataSourceError),
}

pub type Result<T> = std::result::Result<T, Error>;
