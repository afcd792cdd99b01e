//! Datasets produced for matrix visuals.
//!
//! A [`Dataset`] holds one record per result row. Row fields are keyed by
//! their placeholder (`table.column`), values by their label.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::model::MatrixVisual;
use crate::template::FieldReference;

/// A single result row.
pub type Record = Map<String, Value>;

/// Tabular data for one matrix visual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub rows: Vec<Record>,
    #[serde(skip)]
    pub row_fields: Vec<FieldReference>,
}

impl Dataset {
    pub fn new(rows: Vec<Record>, row_fields: Vec<FieldReference>) -> Self {
        Self { rows, row_fields }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Sort rows by the stringified row-field values, in declaration order.
    ///
    /// The sort is stable; missing and null fields compare as "".
    pub fn sort_by_row_fields(&mut self) {
        let keys: Vec<String> = self.row_fields.iter().map(FieldReference::placeholder).collect();
        self.rows.sort_by_cached_key(|record| {
            keys.iter()
                .map(|key| record.get(key).map(display_value).unwrap_or_default())
                .collect::<Vec<_>>()
        });
    }
}

/// Render a JSON value the way templates and parameters see it.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Number of synthetic rows generated for mock data.
pub const MOCK_ROW_COUNT: usize = 3;

/// Deterministic sample data for a matrix.
///
/// Row field values read `<Title Cased Column> <n>`; value cells scale with
/// the row index and the value's position so each column is distinct.
pub fn mock_matrix_data(visual: &MatrixVisual, row_fields: &[FieldReference]) -> Dataset {
    let rows = (1..=MOCK_ROW_COUNT)
        .map(|index| {
            let mut record = Record::new();
            for field in row_fields {
                let seed = format!("{} {}", title_case(&field.column.replace('_', " ")), index);
                record.insert(field.placeholder(), Value::String(seed));
            }
            for (position, value) in visual.values().iter().enumerate() {
                let multiplier = (index * (position + 1)) as u64;
                let format = value.format().unwrap_or_default();
                let cell = if format.starts_with("percent") {
                    float_value(round4(multiplier as f64 * 5.0 / 100.0))
                } else if format.starts_with("duration") {
                    Value::from(multiplier * 900)
                } else {
                    Value::from(multiplier * 100)
                };
                record.insert(value.label().to_string(), cell);
            }
            record
        })
        .collect();

    Dataset::new(rows, row_fields.to_vec())
}

/// Map raw result rows from the execution client onto dataset records.
///
/// Row fields are looked up by placeholder, then DAX reference, then bare
/// column; values by label. Absent entries become null.
pub fn materialize_rows(
    visual: &MatrixVisual,
    row_fields: &[FieldReference],
    raw_rows: Vec<Record>,
) -> Dataset {
    let rows = raw_rows
        .into_iter()
        .map(|raw| {
            let mut record = Record::new();
            for field in row_fields {
                let candidates = [field.placeholder(), field.dax_reference(), field.column.clone()];
                let value = candidates
                    .iter()
                    .find_map(|candidate| raw.get(candidate))
                    .cloned()
                    .unwrap_or(Value::Null);
                record.insert(field.placeholder(), value);
            }
            for value in visual.values() {
                let label = value.label();
                record.insert(
                    label.to_string(),
                    raw.get(label).cloned().unwrap_or(Value::Null),
                );
            }
            record
        })
        .collect();

    Dataset::new(rows, row_fields.to_vec())
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Capitalize the first letter of each alphabetic run, lowercasing the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(ch);
            previous_alpha = false;
        }
    }
    out
}
