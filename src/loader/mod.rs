//! Visual document loading.
//!
//! Loading runs compose resolution, structural overrides, parameter binding,
//! validation and nested resolution, in that order:
//!
//! ```rust,ignore
//! use praeparo::loader::VisualLoader;
//! use std::path::Path;
//!
//! let loaded = VisualLoader::new().load(Path::new("visuals/sales.yaml"))?;
//! println!("{}", loaded.visual.visual_type());
//! ```
//!
//! Compose chains and frame children share one ancestry stack, so a document
//! that reaches itself by either route fails with
//! [`LoadError::CompositionCycle`].

pub mod compose;
pub mod params;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

pub use compose::{deep_merge, ComposeResolver};
pub use params::ParameterBinder;

use crate::model::Visual;
use crate::validation::{validate_document, ValidationError};

/// Errors that can occur when loading a visual.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document could not be read.
    #[error("Failed to read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML.
    #[error("Invalid YAML syntax in {}: {source}", path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The root, `compose` or `parameters` has the wrong shape.
    #[error("Invalid configuration shape in {}: {message}", path.display())]
    Shape { path: PathBuf, message: String },

    /// A document reached itself through compose or frame references.
    #[error("Composition cycle detected: {}", format_chain(chain))]
    CompositionCycle { chain: Vec<PathBuf> },

    /// A bindable field references names absent from the parameter context.
    #[error(
        "Unresolved parameters in {} at {location}: {}",
        path.display(),
        names.join(", ")
    )]
    UnresolvedParameter {
        path: PathBuf,
        location: String,
        names: Vec<String>,
    },

    /// The composed document failed validation.
    #[error("Configuration validation failed for {}: {source}", path.display())]
    Validation {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// A loaded visual and the absolute path it came from.
#[derive(Debug, Clone)]
pub struct LoadedVisual {
    pub source: PathBuf,
    pub visual: Visual,
}

/// Loads visual documents from the filesystem.
#[derive(Debug, Default, Clone)]
pub struct VisualLoader {
    resolver: ComposeResolver,
}

impl VisualLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a top-level document.
    pub fn load(&self, path: &Path) -> LoadResult<LoadedVisual> {
        self.load_with(path, None, None, &[])
    }

    /// Load a document with caller parameters and no structural overrides.
    pub fn load_with_parameters(
        &self,
        path: &Path,
        parameters: &Map<String, Value>,
    ) -> LoadResult<LoadedVisual> {
        self.load_with(path, None, Some(parameters), &[])
    }

    /// Load a document beneath an existing ancestry `stack`.
    ///
    /// `overrides` are deep-merged into the composed document before the
    /// parameter context is built; `parameters` take precedence over the
    /// document's own parameters.
    pub fn load_with(
        &self,
        path: &Path,
        overrides: Option<&Map<String, Value>>,
        parameters: Option<&Map<String, Value>>,
        stack: &[PathBuf],
    ) -> LoadResult<LoadedVisual> {
        let path = compose::canonicalize(path)?;
        tracing::debug!(path = %path.display(), depth = stack.len(), "loading visual");

        let mut document = self.resolver.resolve(&path, stack)?;
        if let Some(overrides) = overrides {
            deep_merge(&mut document, overrides.clone());
        }

        let binder = ParameterBinder::from_document(&path, &document, parameters)?;
        binder.bind(&path, &mut document)?;

        let definition =
            validate_document(&Value::Object(document)).map_err(|source| LoadError::Validation {
                path: path.clone(),
                source,
            })?;

        let visual = definition.resolve(self, &path, stack)?;
        Ok(LoadedVisual {
            source: path,
            visual,
        })
    }
}
