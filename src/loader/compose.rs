//! Compose chain resolution.
//!
//! A document may inherit from parents listed under `compose` (a single path
//! or a list). Parents are resolved recursively in declaration order and
//! deep-merged; the document's own keys are merged last.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{LoadError, LoadResult};

/// Key holding the inheritance chain.
pub const COMPOSE_KEY: &str = "compose";

/// Resolves compose chains against the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComposeResolver;

impl ComposeResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `path` (absolute) with the given ancestry `stack`.
    ///
    /// Fails with a composition cycle when `path` already appears in `stack`;
    /// the check happens before the file is read.
    pub fn resolve(&self, path: &Path, stack: &[PathBuf]) -> LoadResult<Map<String, Value>> {
        if stack.iter().any(|ancestor| ancestor == path) {
            let mut chain = stack.to_vec();
            chain.push(path.to_path_buf());
            return Err(LoadError::CompositionCycle { chain });
        }

        let mut document = read_document(path)?;
        let parents = compose_entries(path, document.remove(COMPOSE_KEY))?;

        let mut child_stack = stack.to_vec();
        child_stack.push(path.to_path_buf());

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut merged = Map::new();
        for parent in parents {
            let parent_path = canonicalize(&base_dir.join(&parent))?;
            tracing::debug!(
                document = %path.display(),
                parent = %parent_path.display(),
                "resolving compose parent"
            );
            let resolved = self.resolve(&parent_path, &child_stack)?;
            deep_merge(&mut merged, resolved);
        }
        deep_merge(&mut merged, document);

        Ok(merged)
    }
}

/// Merge `source` into `target`.
///
/// Keys whose values are mappings on both sides merge recursively; any other
/// value in `source` replaces the one in `target` wholesale.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

pub(crate) fn canonicalize(path: &Path) -> LoadResult<PathBuf> {
    fs::canonicalize(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and parse a document whose root must be a mapping.
fn read_document(path: &Path) -> LoadResult<Map<String, Value>> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed: Value = serde_yaml::from_str(&raw).map_err(|source| LoadError::Syntax {
        path: path.to_path_buf(),
        source,
    })?;

    match parsed {
        Value::Object(map) => Ok(map),
        other => Err(LoadError::Shape {
            path: path.to_path_buf(),
            message: format!(
                "expected mapping at document root, found {}",
                value_kind(&other)
            ),
        }),
    }
}

/// Normalize the `compose` value into an ordered list of relative paths.
fn compose_entries(path: &Path, value: Option<Value>) -> LoadResult<Vec<String>> {
    let shape_error = |message: &str| LoadError::Shape {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(entry)) => Ok(vec![entry]),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(entry) if !entry.trim().is_empty() => Ok(entry),
                _ => Err(shape_error("compose entries must be non-empty strings")),
            })
            .collect(),
        Some(_) => Err(shape_error("compose must be a string or a list of strings")),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
