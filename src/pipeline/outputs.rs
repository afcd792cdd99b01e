//! Output targets and artifact emission.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::render::{Figure, RenderError, Renderer};

/// Supported artifact formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Html,
    Png,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Html => write!(f, "html"),
            OutputKind::Png => write!(f, "png"),
        }
    }
}

/// A requested artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub kind: OutputKind,
    pub path: PathBuf,
    /// PNG scale; falls back to the run's `png_scale`.
    pub scale: Option<f64>,
}

impl OutputTarget {
    pub fn html(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: OutputKind::Html,
            path: path.into(),
            scale: None,
        }
    }

    pub fn png(path: impl Into<PathBuf>, scale: Option<f64>) -> Self {
        Self {
            kind: OutputKind::Png,
            path: path.into(),
            scale,
        }
    }
}

/// A file written by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutputArtifact {
    pub kind: OutputKind,
    pub path: PathBuf,
}

/// A target that could not be written.
#[derive(Debug, thiserror::Error)]
pub enum OutputEmissionError {
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {kind} output {}: {source}", path.display())]
    Write {
        kind: OutputKind,
        path: PathBuf,
        #[source]
        source: RenderError,
    },
}

impl OutputEmissionError {
    pub fn path(&self) -> &Path {
        match self {
            OutputEmissionError::CreateDir { path, .. } | OutputEmissionError::Write { path, .. } => {
                path
            }
        }
    }
}

/// Outcome of writing every requested target.
#[derive(Debug, Default)]
pub struct EmissionReport {
    pub artifacts: Vec<PipelineOutputArtifact>,
    pub failures: Vec<OutputEmissionError>,
}

/// Write `figure` to each target in order.
///
/// A failed target is recorded and the remaining targets are still written;
/// artifacts already on disk are kept.
pub fn emit_outputs(
    renderer: &dyn Renderer,
    figure: &Figure,
    targets: &[OutputTarget],
    png_scale: f64,
) -> EmissionReport {
    let mut report = EmissionReport::default();

    for target in targets {
        match emit_one(renderer, figure, target, png_scale) {
            Ok(()) => {
                tracing::info!(kind = %target.kind, path = %target.path.display(), "wrote output");
                report.artifacts.push(PipelineOutputArtifact {
                    kind: target.kind,
                    path: target.path.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(kind = %target.kind, error = %err, "output emission failed");
                report.failures.push(err);
            }
        }
    }

    report
}

fn emit_one(
    renderer: &dyn Renderer,
    figure: &Figure,
    target: &OutputTarget,
    png_scale: f64,
) -> Result<(), OutputEmissionError> {
    if let Some(parent) = target.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| OutputEmissionError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let result = match target.kind {
        OutputKind::Html => renderer.write_html(figure, &target.path),
        OutputKind::Png => {
            renderer.write_png(figure, &target.path, target.scale.unwrap_or(png_scale))
        }
    };

    result.map_err(|source| OutputEmissionError::Write {
        kind: target.kind,
        path: target.path.clone(),
        source,
    })
}
