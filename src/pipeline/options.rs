//! Runtime switches and execution context for pipeline runs.

use std::collections::HashMap;
use std::path::PathBuf;

use super::outputs::OutputTarget;
use crate::config::PipelineSettings;

/// Controls how datasets are resolved for a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineDataOptions {
    /// Datasource name or path that replaces the visual's own `datasource`.
    pub datasource_override: Option<String>,
    /// Datasource used when neither the override nor the visual names one.
    pub default_datasource: Option<String>,
    /// Execute against this dataset, bypassing datasource lookup.
    pub dataset_id: Option<String>,
    pub workspace_id: Option<String>,
    /// Provider key (`mock` or a provider registered on the planner).
    pub provider_key: Option<String>,
    /// Case key → provider key; wins over `provider_key` for matching cases.
    pub provider_case_overrides: HashMap<String, String>,
}

/// Switches toggled by callers when executing visuals.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data: PipelineDataOptions,
    pub outputs: Vec<OutputTarget>,
    pub print_dax: bool,
    pub ensure_non_empty_rows: bool,
    pub ensure_values_present: bool,
    pub validate_define: bool,
    pub sort_rows: bool,
    /// Scale for PNG targets that do not set their own.
    pub png_scale: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            data: PipelineDataOptions::default(),
            outputs: Vec::new(),
            print_dax: false,
            ensure_non_empty_rows: false,
            ensure_values_present: false,
            validate_define: false,
            sort_rows: false,
            png_scale: 2.0,
        }
    }
}

impl PipelineOptions {
    /// Options seeded from the `[pipeline]` settings table.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            ensure_non_empty_rows: settings.ensure_non_empty_rows,
            ensure_values_present: settings.ensure_values_present,
            validate_define: settings.validate_define,
            sort_rows: settings.sort_rows,
            png_scale: settings.png_scale,
            ..Self::default()
        }
    }

    /// Same options with no output targets.
    pub fn without_outputs(&self) -> Self {
        Self {
            outputs: Vec::new(),
            ..self.clone()
        }
    }
}

/// Identifies the visual and environment participating in a run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Document the visual was loaded from; anchors datasource lookup.
    pub config_path: Option<PathBuf>,
    pub project_root: Option<PathBuf>,
    /// Stable identifier of this execution, extended per frame child.
    pub case_key: Option<String>,
    pub options: PipelineOptions,
}

impl ExecutionContext {
    pub fn new(config_path: impl Into<PathBuf>, options: PipelineOptions) -> Self {
        let config_path = config_path.into();
        let case_key = config_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string);
        Self {
            config_path: Some(config_path),
            project_root: None,
            case_key,
            options,
        }
    }

    /// Provider key for this execution, lowercased.
    ///
    /// A case override matching `case_key` wins over the default key.
    pub fn provider_key(&self) -> Option<String> {
        let data = &self.options.data;
        let from_case = self
            .case_key
            .as_ref()
            .and_then(|case| data.provider_case_overrides.get(case));

        from_case
            .into_iter()
            .chain(data.provider_key.as_ref())
            .map(|key| key.trim().to_lowercase())
            .find(|key| !key.is_empty())
    }
}
