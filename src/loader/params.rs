//! Parameter binding.
//!
//! Builds a string context from a composed document and re-renders the
//! bindable fields through it. Only row labels and filter expressions are
//! bound; row templates keep their placeholders for the data stage.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde_json::{Map, Value};

use super::compose::value_kind;
use super::{LoadError, LoadResult};
use crate::data::display_value;
use crate::template::{placeholder_names, render_with_map};

/// Key holding document-level parameters.
pub const PARAMETERS_KEY: &str = "parameters";

/// Binds parameters into the allow-listed fields of a document.
#[derive(Debug, Clone, Default)]
pub struct ParameterBinder {
    context: HashMap<String, String>,
}

impl ParameterBinder {
    /// Build the binding context for `document`.
    ///
    /// Precedence, lowest first: top-level scalar keys, the `parameters`
    /// mapping, then `overrides` supplied by the caller.
    pub fn from_document(
        path: &Path,
        document: &Map<String, Value>,
        overrides: Option<&Map<String, Value>>,
    ) -> LoadResult<Self> {
        let mut context = HashMap::new();

        for (key, value) in document {
            if is_scalar(value) {
                context.insert(key.clone(), display_value(value));
            }
        }

        match document.get(PARAMETERS_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::Object(parameters)) => insert_parameters(path, &mut context, parameters)?,
            Some(other) => {
                return Err(LoadError::Shape {
                    path: path.to_path_buf(),
                    message: format!("parameters must be a mapping, found {}", value_kind(other)),
                })
            }
        }

        if let Some(overrides) = overrides {
            insert_parameters(path, &mut context, overrides)?;
        }

        Ok(Self { context })
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// Render one template, failing when any placeholder is absent from the context.
    pub fn render(&self, path: &Path, location: &str, template: &str) -> LoadResult<String> {
        let missing: BTreeSet<String> = placeholder_names(template)
            .into_iter()
            .filter(|name| !self.context.contains_key(name))
            .collect();

        let rendered = render_with_map(template, &self.context);
        if !missing.is_empty() {
            return Err(LoadError::UnresolvedParameter {
                path: path.to_path_buf(),
                location: location.to_string(),
                names: missing.into_iter().collect(),
            });
        }
        Ok(rendered)
    }

    /// Bind row labels and filter expressions in place.
    pub fn bind(&self, path: &Path, document: &mut Map<String, Value>) -> LoadResult<()> {
        if let Some(Value::Array(rows)) = document.get_mut("rows") {
            for (index, row) in rows.iter_mut().enumerate() {
                if let Some(Value::String(label)) =
                    row.as_object_mut().and_then(|row| row.get_mut("label"))
                {
                    *label = self.render(path, &format!("rows[{}].label", index), label)?;
                }
            }
        }

        if let Some(Value::Array(filters)) = document.get_mut("filters") {
            for (index, filter) in filters.iter_mut().enumerate() {
                if let Some(Value::String(expression)) = filter
                    .as_object_mut()
                    .and_then(|filter| filter.get_mut("expression"))
                {
                    *expression =
                        self.render(path, &format!("filters[{}].expression", index), expression)?;
                }
            }
        }

        Ok(())
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn insert_parameters(
    path: &Path,
    context: &mut HashMap<String, String>,
    parameters: &Map<String, Value>,
) -> LoadResult<()> {
    for (key, value) in parameters {
        if !is_scalar(value) && !value.is_null() {
            return Err(LoadError::Shape {
                path: path.to_path_buf(),
                message: format!("parameter '{}' must be a scalar, found {}", key, value_kind(value)),
            });
        }
        context.insert(key.clone(), display_value(value));
    }
    Ok(())
}
