//! Placeholder templates used by row definitions, labels and filters.
//!
//! Templates embed `{{ expr }}` placeholders. An expression names a data field
//! (`table.column` or `column`) or a parameter, optionally followed by a
//! `| filter(...)` suffix that is ignored when resolving references:
//!
//! ```text
//! "{{ dim_calendar.Month | upper }} ({{ Year }})"
//!      └── table ──┘ └col┘            └col┘
//! ```
//!
//! Two substitution modes exist and they deliberately differ on missing keys:
//! [`render_template`] (data rows) emits an empty string, while the parameter
//! binder in [`crate::loader`] fails loudly.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a single `{{ ... }}` placeholder.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(?P<expr>[^}]+?)\s*\}\}").expect("valid placeholder regex"));

/// Errors raised while parsing placeholder expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("encountered empty placeholder")]
    EmptyPlaceholder,

    #[error("invalid field expression: {0:?}")]
    InvalidFieldExpression(String),
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// A data field referenced from a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    /// Normalized expression (filter suffix stripped, whitespace trimmed).
    pub expression: String,
    pub table: Option<String>,
    pub column: String,
}

impl FieldReference {
    /// Qualified DAX column reference: `table[column]` or `[column]`.
    pub fn dax_reference(&self) -> String {
        match &self.table {
            Some(table) => format!("{}[{}]", table, self.column),
            None => format!("[{}]", self.column),
        }
    }

    /// Canonical placeholder form, also the record key used by datasets.
    pub fn placeholder(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table, self.column),
            None => self.column.clone(),
        }
    }
}

/// Strip an optional `| filter(...)` suffix from a placeholder expression.
pub fn base_expression(expression: &str) -> &str {
    expression
        .split_once('|')
        .map_or(expression, |(base, _)| base)
        .trim()
}

/// Parse a placeholder expression into a [`FieldReference`].
pub fn parse_field(expression: &str) -> TemplateResult<FieldReference> {
    let base = base_expression(expression);
    if base.is_empty() {
        return Err(TemplateError::EmptyPlaceholder);
    }

    let (table, column) = match base.split_once('.') {
        Some((table, column)) => {
            let table = table.trim();
            let table = (!table.is_empty()).then(|| table.to_string());
            (table, column.trim())
        }
        None => (None, base),
    };

    if column.is_empty() {
        return Err(TemplateError::InvalidFieldExpression(expression.to_string()));
    }

    Ok(FieldReference {
        expression: base.to_string(),
        table,
        column: column.to_string(),
    })
}

/// Raw placeholder expressions in the order they appear.
fn raw_expressions(template: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.name("expr").map(|m| m.as_str()))
}

/// Field references of a single template, in order of appearance.
pub fn iter_field_references(
    template: &str,
) -> impl Iterator<Item = TemplateResult<FieldReference>> + '_ {
    raw_expressions(template).map(parse_field)
}

/// Unique field references across `templates`, in first-seen order.
///
/// Duplicates are detected on the normalized expression, so
/// `{{ dim.City }}` and `{{dim.City | upper}}` count once.
pub fn extract_field_references<I, S>(templates: I) -> TemplateResult<Vec<FieldReference>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for template in templates {
        for reference in iter_field_references(template.as_ref()) {
            let reference = reference?;
            if seen.insert(reference.expression.clone()) {
                ordered.push(reference);
            }
        }
    }
    Ok(ordered)
}

/// Base expressions of every placeholder in `template`, in order.
pub fn placeholder_names(template: &str) -> Vec<String> {
    raw_expressions(template)
        .map(|expr| base_expression(expr).to_string())
        .collect()
}

/// Substitute placeholders from `context`; missing keys render as "".
pub fn render_template<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let expr = caps.name("expr").map_or("", |m| m.as_str());
            lookup(base_expression(expr)).unwrap_or_default()
        })
        .into_owned()
}

/// [`render_template`] over a plain string map.
pub fn render_with_map(template: &str, context: &HashMap<String, String>) -> String {
    render_template(template, |key| context.get(key).cloned())
}

/// Derive a column header from a row template.
///
/// Each placeholder becomes the column name of the matching reference (or the
/// raw expression when none matches). Empty results fall back to `"Row"`.
pub fn label_from_template(template: &str, references: &[FieldReference]) -> String {
    let label = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        let expr = caps.name("expr").map_or("", |m| m.as_str());
        let base = base_expression(expr);
        references
            .iter()
            .find(|reference| reference.expression == base)
            .map_or_else(|| expr.to_string(), |reference| reference.column.clone())
    });

    let label = label.trim();
    if label.is_empty() {
        "Row".to_string()
    } else {
        label.to_string()
    }
}
