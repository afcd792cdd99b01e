//! Matrix visuals: row templates, value columns and filters.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::data::display_value;
use crate::validation::ValidationError;

/// Grand-total display options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Totals {
    #[default]
    Off,
    Row,
    Column,
    Both,
}

/// A row dimension column expressed as a placeholder template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowTemplate {
    template: String,
    label: Option<String>,
    hidden: bool,
}

impl RowTemplate {
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Explicit header override, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Hidden rows still contribute fields to the query but are not rendered.
    pub fn hidden(&self) -> bool {
        self.hidden
    }
}

/// Display rule that rewrites a measure as a share of its column total.
const PERCENT_OF_COLUMN_TOTAL: &str = "percent of column total";

/// A value column backed by a measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSpec {
    id: String,
    label: String,
    format: Option<String>,
    show_as: Option<String>,
}

impl ValueSpec {
    /// Measure name or bracket-quoted measure reference.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Header label; also the dataset key for this value.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Formatting directive such as `percent:1` or `duration:hms`.
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn show_as(&self) -> Option<&str> {
        self.show_as.as_deref()
    }

    /// The measure reference: `id` when already bracketed, else `[id]`.
    pub fn measure(&self) -> String {
        if self.id.starts_with('[') && self.id.ends_with(']') {
            self.id.clone()
        } else {
            format!("[{}]", self.id)
        }
    }

    pub fn is_percent_of_column_total(&self) -> bool {
        self.show_as
            .as_deref()
            .is_some_and(|rule| rule.trim().to_lowercase() == PERCENT_OF_COLUMN_TOTAL)
    }
}

/// A filter applied around the summarized table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// Raw DAX boolean expression, passed through verbatim.
    Expression(String),
    /// `table[column] IN { ... }` membership filter.
    Include {
        table: String,
        column: String,
        values: Vec<String>,
    },
}

/// A validated matrix visual.
///
/// Instances are immutable: fields are only reachable through accessors and
/// loaders hand them out behind `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixVisual {
    title: Option<String>,
    description: Option<String>,
    define: Option<String>,
    datasource: Option<String>,
    rows: Vec<RowTemplate>,
    values: Vec<ValueSpec>,
    filters: Vec<FilterSpec>,
    totals: Totals,
    auto_height: bool,
}

impl MatrixVisual {
    /// Validate a (merged, parameter-bound) document.
    pub fn from_value(document: &Value) -> Result<Self, ValidationError> {
        let raw = RawMatrix::deserialize(document)
            .map_err(|err| ValidationError::Schema(err.to_string()))?;
        raw.validate()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// DAX `DEFINE` block as written (not trimmed).
    pub fn define(&self) -> Option<&str> {
        self.define.as_deref()
    }

    /// Named datasource reference.
    pub fn datasource(&self) -> Option<&str> {
        self.datasource.as_deref()
    }

    pub fn rows(&self) -> &[RowTemplate] {
        &self.rows
    }

    pub fn values(&self) -> &[ValueSpec] {
        &self.values
    }

    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn auto_height(&self) -> bool {
        self.auto_height
    }

    /// Row templates in declaration order, hidden rows included.
    pub fn row_templates(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.template.as_str())
    }
}

// ============================================================================
// Raw document shapes
// ============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawMatrix {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    define: Option<String>,
    #[serde(default)]
    datasource: Option<String>,
    #[serde(default)]
    rows: Option<Vec<RawRow>>,
    #[serde(default)]
    values: Option<Vec<RawValue>>,
    #[serde(default)]
    filters: Option<Vec<RawFilter>>,
    #[serde(default)]
    totals: Totals,
    #[serde(default = "default_true", rename = "autoHeight", alias = "auto_height")]
    auto_height: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRow {
    Template(String),
    Detailed {
        template: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        hidden: bool,
    },
}

#[derive(Debug, Deserialize)]
struct RawValue {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default, alias = "showAs")]
    show_as: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFilter {
    #[serde(default)]
    expression: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    include: Option<Vec<Value>>,
}

/// Trim an optional string, treating blank as absent.
fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawMatrix {
    fn validate(self) -> Result<MatrixVisual, ValidationError> {
        let rows = self.rows.unwrap_or_default();
        if rows.is_empty() {
            return Err(ValidationError::EmptyRows);
        }
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| row.validate(index))
            .collect::<Result<Vec<_>, _>>()?;

        let values = self.values.unwrap_or_default();
        if values.is_empty() {
            return Err(ValidationError::EmptyValues);
        }
        let mut seen = HashSet::new();
        let mut validated_values = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let value = value.validate(index)?;
            if !seen.insert(value.id.clone()) {
                return Err(ValidationError::DuplicateValueId { id: value.id });
            }
            validated_values.push(value);
        }

        let filters = self
            .filters
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, filter)| filter.validate(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MatrixVisual {
            title: normalize_optional(self.title),
            description: normalize_optional(self.description),
            define: self.define.filter(|d| !d.trim().is_empty()),
            datasource: normalize_optional(self.datasource),
            rows,
            values: validated_values,
            filters,
            totals: self.totals,
            auto_height: self.auto_height,
        })
    }
}

impl RawRow {
    fn validate(self, index: usize) -> Result<RowTemplate, ValidationError> {
        let (template, label, hidden) = match self {
            RawRow::Template(template) => (template, None, false),
            RawRow::Detailed {
                template,
                label,
                hidden,
            } => (template, label, hidden),
        };

        let template = template.trim().to_string();
        if template.is_empty() {
            return Err(ValidationError::EmptyRowTemplate { index });
        }

        Ok(RowTemplate {
            template,
            label: normalize_optional(label),
            hidden,
        })
    }
}

impl RawValue {
    fn validate(self, index: usize) -> Result<ValueSpec, ValidationError> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(ValidationError::EmptyValueId { index });
        }
        let label = normalize_optional(self.label).unwrap_or_else(|| id.clone());

        Ok(ValueSpec {
            id,
            label,
            format: normalize_optional(self.format),
            show_as: normalize_optional(self.show_as),
        })
    }
}

impl RawFilter {
    fn validate(self, index: usize) -> Result<FilterSpec, ValidationError> {
        match (self.expression, self.field, self.include) {
            (Some(expression), None, None) => {
                let expression = expression.trim().to_string();
                if expression.is_empty() {
                    return Err(ValidationError::FilterMode {
                        index,
                        issue: "expression cannot be empty".to_string(),
                    });
                }
                Ok(FilterSpec::Expression(expression))
            }
            (None, Some(field), Some(include)) => {
                let (table, column) = split_filter_field(&field)
                    .ok_or_else(|| ValidationError::MalformedFilterField {
                        index,
                        field: field.clone(),
                    })?;

                let mut seen = HashSet::new();
                let mut values = Vec::with_capacity(include.len());
                for item in &include {
                    if item.is_array() || item.is_object() || item.is_null() {
                        return Err(ValidationError::FilterMode {
                            index,
                            issue: "include entries must be scalar values".to_string(),
                        });
                    }
                    let value = display_value(item);
                    if seen.insert(value.clone()) {
                        values.push(value);
                    }
                }
                if values.is_empty() {
                    return Err(ValidationError::EmptyInclude { index });
                }

                Ok(FilterSpec::Include {
                    table,
                    column,
                    values,
                })
            }
            (Some(_), _, _) => Err(ValidationError::FilterMode {
                index,
                issue: "expression cannot be combined with field/include".to_string(),
            }),
            (None, None, None) => Err(ValidationError::FilterMode {
                index,
                issue: "declare either expression or field with include".to_string(),
            }),
            (None, _, _) => Err(ValidationError::FilterMode {
                index,
                issue: "field and include must be declared together".to_string(),
            }),
        }
    }
}

/// Split `table.column`; exactly one dot with both sides non-empty.
fn split_filter_field(field: &str) -> Option<(String, String)> {
    let field = field.trim();
    if field.matches('.').count() != 1 {
        return None;
    }
    let (table, column) = field.split_once('.')?;
    let (table, column) = (table.trim(), column.trim());
    if table.is_empty() || column.is_empty() {
        return None;
    }
    Some((table.to_string(), column.to_string()))
}
