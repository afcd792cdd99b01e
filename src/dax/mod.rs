//! DAX query compilation for matrix visuals.
//!
//! ```text
//! MatrixVisual + row fields → SUMMARIZECOLUMNS body → [CALCULATETABLE] → [DEFINE] EVALUATE
//! ```
//!
//! Compilation is a pure function: the same visual and row fields always
//! produce byte-identical statement text.
//!
//! # Example
//!
//! ```ignore
//! use praeparo::dax::compile_visual;
//!
//! let plan = compile_visual(&matrix)?;
//! println!("{}", plan.statement);
//! ```

use serde::Serialize;

use crate::model::{FilterSpec, MatrixVisual, ValueSpec};
use crate::template::{extract_field_references, FieldReference, TemplateResult};

/// Separator between clauses inside a function call.
const CLAUSE_SEPARATOR: &str = ",\n    ";

/// A compiled query and the pieces it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaxQueryPlan {
    /// Full statement text sent to the execution client.
    pub statement: String,
    #[serde(skip)]
    pub rows: Vec<FieldReference>,
    /// Bracketed measure references in value order.
    pub values: Vec<String>,
    /// Trimmed `DEFINE` body, when one was declared.
    pub define: Option<String>,
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile a matrix, extracting row fields from its templates.
pub fn compile_visual(visual: &MatrixVisual) -> TemplateResult<DaxQueryPlan> {
    let row_fields = extract_field_references(visual.row_templates())?;
    Ok(compile_matrix(visual, &row_fields))
}

/// Compile a matrix against an explicit, ordered list of row fields.
pub fn compile_matrix(visual: &MatrixVisual, row_fields: &[FieldReference]) -> DaxQueryPlan {
    let mut parts: Vec<String> = row_fields.iter().map(FieldReference::dax_reference).collect();

    let mut measures = Vec::with_capacity(visual.values().len());
    for value in visual.values() {
        let measure = format_measure(value.id());
        let expression = value_expression(value, &measure, row_fields);
        parts.push(format!("\"{}\", {}", escape_string(value.label()), expression));
        measures.push(measure);
    }

    let mut body = format!("SUMMARIZECOLUMNS(\n    {}\n)", parts.join(CLAUSE_SEPARATOR));

    let filters: Vec<String> = visual.filters().iter().map(filter_clause).collect();
    if !filters.is_empty() {
        body = format!(
            "CALCULATETABLE(\n{}{}{}\n)",
            indent(&body),
            CLAUSE_SEPARATOR,
            filters.join(CLAUSE_SEPARATOR)
        );
    }

    let define = visual
        .define()
        .map(str::trim)
        .filter(|define| !define.is_empty())
        .map(str::to_string);

    let mut statement = String::new();
    if let Some(define) = &define {
        statement.push_str("DEFINE\n");
        statement.push_str(define);
        statement.push_str("\n\n");
    }
    statement.push_str("EVALUATE\n");
    statement.push_str(&body);

    DaxQueryPlan {
        statement,
        rows: row_fields.to_vec(),
        values: measures,
        define,
    }
}

// ============================================================================
// Clause helpers
// ============================================================================

/// Double embedded quotes for use inside a DAX string literal.
pub fn escape_string(value: &str) -> String {
    value.replace('"', "\"\"")
}

/// `[id]`, unless the id is already bracketed.
pub fn format_measure(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        trimmed.to_string()
    } else {
        format!("[{}]", trimmed)
    }
}

/// Apply the value's display transform to its measure.
///
/// "Percent of column total" divides by the measure with filters removed:
/// every row field but the last contributes its table, the last its full
/// column reference.
fn value_expression(value: &ValueSpec, measure: &str, row_fields: &[FieldReference]) -> String {
    let Some((last, others)) = row_fields.split_last() else {
        return measure.to_string();
    };
    if !value.is_percent_of_column_total() {
        return measure.to_string();
    }

    let removals: Vec<String> = others
        .iter()
        .map(|field| field.table.clone().unwrap_or_else(|| field.dax_reference()))
        .chain(std::iter::once(last.dax_reference()))
        .map(|argument| format!("REMOVEFILTERS({})", argument))
        .collect();

    format!(
        "DIVIDE({}, CALCULATE({}, {}))",
        measure,
        measure,
        removals.join(", ")
    )
}

fn filter_clause(filter: &FilterSpec) -> String {
    match filter {
        FilterSpec::Expression(expression) => expression.clone(),
        FilterSpec::Include {
            table,
            column,
            values,
        } => {
            let quoted: Vec<String> = values
                .iter()
                .map(|value| format!("\"{}\"", escape_string(value)))
                .collect();
            format!("{}[{}] IN {{ {} }}", table, column, quoted.join(", "))
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
