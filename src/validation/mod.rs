//! Validation of visual documents.
//!
//! A document is a fully composed, parameter-bound JSON tree. Validation
//! picks the visual type from the `type` key and checks the structure for
//! that type, returning a [`VisualDefinition`].

use serde_json::Value;

use crate::model::{FrameDefinition, MatrixVisual, VisualDefinition, FRAME, MATRIX};

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Document does not match the expected shape.
    Schema(String),
    /// The `type` key names no known visual.
    UnsupportedVisualType { found: String },
    /// Matrix declares no rows.
    EmptyRows,
    /// Matrix declares no values.
    EmptyValues,
    /// A row template is blank.
    EmptyRowTemplate { index: usize },
    /// A value id is blank.
    EmptyValueId { index: usize },
    /// Two values share the same id.
    DuplicateValueId { id: String },
    /// A filter mixes or omits its modes.
    FilterMode { index: usize, issue: String },
    /// Filter field is not `table.column`.
    MalformedFilterField { index: usize, field: String },
    /// Filter include list has no values.
    EmptyInclude { index: usize },
    /// Frame declares no children.
    EmptyChildren,
    /// Frame child has no `ref`.
    MissingChildRef { index: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Schema(message) => write!(f, "Invalid document: {}", message),
            ValidationError::UnsupportedVisualType { found } => {
                write!(f, "Unsupported visual type '{}'", found)
            }
            ValidationError::EmptyRows => write!(f, "Matrix must declare at least one row"),
            ValidationError::EmptyValues => write!(f, "Matrix must declare at least one value"),
            ValidationError::EmptyRowTemplate { index } => {
                write!(f, "Row {} has an empty template", index)
            }
            ValidationError::EmptyValueId { index } => {
                write!(f, "Value {} has an empty id", index)
            }
            ValidationError::DuplicateValueId { id } => {
                write!(f, "Duplicate value id: '{}'", id)
            }
            ValidationError::FilterMode { index, issue } => {
                write!(f, "Filter {}: {}", index, issue)
            }
            ValidationError::MalformedFilterField { index, field } => {
                write!(
                    f,
                    "Filter {} field '{}' must be in 'table.column' form",
                    index, field
                )
            }
            ValidationError::EmptyInclude { index } => {
                write!(f, "Filter {} include list cannot be empty", index)
            }
            ValidationError::EmptyChildren => write!(f, "Frame must declare at least one child"),
            ValidationError::MissingChildRef { index } => {
                write!(f, "Frame child {} is missing 'ref'", index)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a composed document into a visual definition.
///
/// `type` defaults to `matrix` when absent.
pub fn validate_document(document: &Value) -> Result<VisualDefinition, ValidationError> {
    let Value::Object(root) = document else {
        return Err(ValidationError::Schema(
            "document root must be a mapping".to_string(),
        ));
    };

    let visual_type = match root.get("type") {
        None | Some(Value::Null) => MATRIX.to_string(),
        Some(Value::String(kind)) => kind.trim().to_lowercase(),
        Some(other) => {
            return Err(ValidationError::UnsupportedVisualType {
                found: other.to_string(),
            })
        }
    };

    match visual_type.as_str() {
        MATRIX => MatrixVisual::from_value(document).map(VisualDefinition::Matrix),
        FRAME => FrameDefinition::from_value(document).map(VisualDefinition::Frame),
        _ => Err(ValidationError::UnsupportedVisualType { found: visual_type }),
    }
}
