//! Visual configuration types.
//!
//! Documents validate into a [`VisualDefinition`]; resolving the definition
//! (loading frame children through the same loader and ancestry stack)
//! produces an immutable [`Visual`].

pub mod frame;
pub mod matrix;

pub use frame::{FrameChild, FrameChildDefinition, FrameDefinition, FrameVisual, Layout};
pub use matrix::{FilterSpec, MatrixVisual, RowTemplate, Totals, ValueSpec};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::loader::{LoadResult, VisualLoader};

/// Type discriminator for matrix visuals (also the default).
pub const MATRIX: &str = "matrix";
/// Type discriminator for frame visuals.
pub const FRAME: &str = "frame";

/// A validated document before nested references are resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualDefinition {
    Matrix(MatrixVisual),
    Frame(FrameDefinition),
}

impl VisualDefinition {
    /// Resolve nested references. Matrices resolve to themselves.
    pub fn resolve(
        self,
        loader: &VisualLoader,
        path: &Path,
        stack: &[PathBuf],
    ) -> LoadResult<Visual> {
        match self {
            VisualDefinition::Matrix(matrix) => Ok(Visual::Matrix(Arc::new(matrix))),
            VisualDefinition::Frame(frame) => {
                let frame = frame.resolve(loader, path, stack)?;
                Ok(Visual::Frame(Arc::new(frame)))
            }
        }
    }
}

/// A fully resolved visual, cheap to clone and never mutated.
#[derive(Debug, Clone)]
pub enum Visual {
    Matrix(Arc<MatrixVisual>),
    Frame(Arc<FrameVisual>),
}

impl Visual {
    /// The type key planners are registered under.
    pub fn visual_type(&self) -> &'static str {
        match self {
            Visual::Matrix(_) => MATRIX,
            Visual::Frame(_) => FRAME,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Visual::Matrix(matrix) => matrix.title(),
            Visual::Frame(frame) => frame.title(),
        }
    }

    pub fn as_matrix(&self) -> Option<&Arc<MatrixVisual>> {
        match self {
            Visual::Matrix(matrix) => Some(matrix),
            Visual::Frame(_) => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Arc<FrameVisual>> {
        match self {
            Visual::Frame(frame) => Some(frame),
            Visual::Matrix(_) => None,
        }
    }
}

impl From<MatrixVisual> for Visual {
    fn from(matrix: MatrixVisual) -> Self {
        Visual::Matrix(Arc::new(matrix))
    }
}
