//! Named datasource resolution.
//!
//! A visual's `datasource` key names a YAML definition located relative to
//! the visual:
//!
//! ```text
//! datasource: sales          → <ancestor>/datasources/sales.yaml|yml, then <ancestor>/sales.yaml|yml
//! datasource: ../ds/x.yaml   → <ancestor>/../ds/x.yaml (or the absolute path itself)
//! datasource: mock / absent  → synthetic data
//! ```
//!
//! Definition values may be `${env:NAME}` or `env:NAME`; missing values fall
//! back to the `PRAEPARO_PBI_*` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::{
    PowerBiSettings, CLIENT_ID_ENV_KEY, CLIENT_SECRET_ENV_KEY, DATASET_ENV_KEY, DEFAULT_SCOPE,
    REFRESH_TOKEN_ENV_KEY, SCOPE_ENV_KEY, TENANT_ID_ENV_KEY, WORKSPACE_ENV_KEY,
};

/// Name of the synthetic datasource.
pub const MOCK_DATASOURCE: &str = "mock";

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

static ENV_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"^\$\{env:(?P<name>[A-Z0-9_]+)\}$").expect("valid env pattern"),
        Regex::new(r"^env:(?P<name>[A-Z0-9_]+)$").expect("valid env pattern"),
    ]
});

/// Errors raised while resolving a datasource.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("Data source definition not found: {}", candidate.display())]
    NotFound { candidate: PathBuf },

    #[error("Unable to locate data source '{reference}' for visual {}", visual.display())]
    Unlocatable { reference: String, visual: PathBuf },

    #[error("Failed to read data source definition {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML syntax in data source {}: {source}", path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Data source configuration validation failed for {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    #[error(
        "Environment variable '{name}' required by data source '{datasource}' is not set ({})",
        path.display()
    )]
    MissingEnvVar {
        name: String,
        datasource: String,
        path: PathBuf,
    },

    #[error(
        "Data source '{datasource}' missing required field '{field}' ({}); set it explicitly or provide environment variable '{env_key}'",
        path.display()
    )]
    MissingField {
        datasource: String,
        field: &'static str,
        env_key: &'static str,
        path: PathBuf,
    },

    #[error("Data source '{name}' lacks a dataset id")]
    MissingDatasetId { name: String },

    #[error("Matrix execution requires a config path to resolve data source '{reference}'")]
    MissingConfigPath { reference: String },

    #[error("No data provider registered for key '{0}'")]
    UnknownProvider(String),
}

/// Kind of a resolved datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Mock,
    PowerBi,
}

/// A datasource after lookup and environment expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDataSource {
    pub name: String,
    pub kind: DataSourceKind,
    pub dataset_id: Option<String>,
    pub workspace_id: Option<String>,
    pub settings: Option<PowerBiSettings>,
    pub source_path: Option<PathBuf>,
}

impl ResolvedDataSource {
    pub fn mock() -> Self {
        Self {
            name: MOCK_DATASOURCE.to_string(),
            kind: DataSourceKind::Mock,
            dataset_id: None,
            workspace_id: None,
            settings: None,
            source_path: None,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.kind == DataSourceKind::Mock
    }
}

/// On-disk datasource definition.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceDefinition {
    #[serde(default, rename = "type")]
    pub kind: Option<DefinitionKind>,
    #[serde(default, rename = "datasetId", alias = "dataset_id")]
    pub dataset_id: Option<String>,
    #[serde(default, rename = "workspaceId", alias = "workspace_id")]
    pub workspace_id: Option<String>,
    #[serde(default, rename = "tenantId", alias = "tenant_id")]
    pub tenant_id: Option<String>,
    #[serde(default, rename = "clientId", alias = "client_id")]
    pub client_id: Option<String>,
    #[serde(default, rename = "clientSecret", alias = "client_secret")]
    pub client_secret: Option<String>,
    #[serde(default, rename = "refreshToken", alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Powerbi,
}

impl DataSourceDefinition {
    /// Read and validate a definition file.
    pub fn from_file(path: &Path) -> Result<Self, DataSourceError> {
        let raw = fs::read_to_string(path).map_err(|source| DataSourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: serde_json::Value =
            serde_yaml::from_str(&raw).map_err(|source| DataSourceError::Syntax {
                path: path.to_path_buf(),
                source,
            })?;
        let value = match value {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            serde_json::Value::Object(map) => serde_json::Value::Object(map),
            _ => {
                return Err(DataSourceError::Invalid {
                    path: path.to_path_buf(),
                    message: "expected mapping at data source root".to_string(),
                })
            }
        };
        DataSourceDefinition::deserialize(value).map_err(|err| DataSourceError::Invalid {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

/// Resolve `reference` for the visual at `visual_path` using the process environment.
pub fn resolve_datasource(
    reference: Option<&str>,
    visual_path: &Path,
) -> Result<ResolvedDataSource, DataSourceError> {
    resolve_datasource_with(reference, visual_path, &|key| env::var(key).ok())
}

/// [`resolve_datasource`] with an explicit environment lookup.
pub fn resolve_datasource_with(
    reference: Option<&str>,
    visual_path: &Path,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<ResolvedDataSource, DataSourceError> {
    let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(ResolvedDataSource::mock());
    };

    let candidates = candidate_paths(reference, visual_path);
    let Some(target) = candidates.iter().find(|candidate| candidate.is_file()).cloned() else {
        if reference.eq_ignore_ascii_case(MOCK_DATASOURCE) {
            return Ok(ResolvedDataSource::mock());
        }
        return Err(match candidates.into_iter().next() {
            Some(candidate) => DataSourceError::NotFound { candidate },
            None => DataSourceError::Unlocatable {
                reference: reference.to_string(),
                visual: visual_path.to_path_buf(),
            },
        });
    };

    tracing::debug!(datasource = reference, path = %target.display(), "resolved datasource");
    let definition = DataSourceDefinition::from_file(&target)?;
    let fields = FieldResolver {
        datasource: reference,
        path: &target,
        lookup,
    };

    let dataset_id = fields.required(&definition.dataset_id, "dataset_id", DATASET_ENV_KEY)?;
    let workspace_id = fields.optional(&definition.workspace_id, WORKSPACE_ENV_KEY)?;
    let settings = PowerBiSettings {
        tenant_id: fields.required(&definition.tenant_id, "tenant_id", TENANT_ID_ENV_KEY)?,
        client_id: fields.required(&definition.client_id, "client_id", CLIENT_ID_ENV_KEY)?,
        client_secret: fields.required(
            &definition.client_secret,
            "client_secret",
            CLIENT_SECRET_ENV_KEY,
        )?,
        refresh_token: fields.required(
            &definition.refresh_token,
            "refresh_token",
            REFRESH_TOKEN_ENV_KEY,
        )?,
        scope: fields
            .optional(&definition.scope, SCOPE_ENV_KEY)?
            .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
    };

    Ok(ResolvedDataSource {
        name: reference.to_string(),
        kind: DataSourceKind::PowerBi,
        dataset_id: Some(dataset_id),
        workspace_id,
        settings: Some(settings),
        source_path: Some(target),
    })
}

/// Candidate definition paths for `reference`, in search order, deduplicated.
pub fn candidate_paths(reference: &str, visual_path: &Path) -> Vec<PathBuf> {
    let start = visual_path.parent().unwrap_or_else(|| Path::new("."));
    let reference_path = Path::new(reference);
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut register = |path: PathBuf| {
        if !candidates.contains(&path) {
            candidates.push(path);
        }
    };

    let has_extension = reference_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext));
    let has_separator = reference_path.file_name().and_then(|n| n.to_str()) != Some(reference);

    if has_extension || has_separator {
        if reference_path.is_absolute() {
            register(reference_path.to_path_buf());
        } else {
            for base in start.ancestors() {
                register(base.join(reference_path));
            }
        }
        return candidates;
    }

    for base in start.ancestors() {
        let data_dir = base.join("datasources");
        if data_dir.is_dir() {
            for ext in EXTENSIONS {
                register(data_dir.join(format!("{}.{}", reference, ext)));
            }
        }
        for ext in EXTENSIONS {
            register(base.join(format!("{}.{}", reference, ext)));
        }
    }
    candidates
}

struct FieldResolver<'a> {
    datasource: &'a str,
    path: &'a Path,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl FieldResolver<'_> {
    /// Expand a declared value, falling back to `env_key`.
    fn optional(
        &self,
        declared: &Option<String>,
        env_key: &'static str,
    ) -> Result<Option<String>, DataSourceError> {
        let expanded = match declared.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(text) => Some(self.expand(text)?),
            None => None,
        };
        Ok(expanded.or_else(|| (self.lookup)(env_key)))
    }

    fn required(
        &self,
        declared: &Option<String>,
        field: &'static str,
        env_key: &'static str,
    ) -> Result<String, DataSourceError> {
        self.optional(declared, env_key)?
            .ok_or_else(|| DataSourceError::MissingField {
                datasource: self.datasource.to_string(),
                field,
                env_key,
                path: self.path.to_path_buf(),
            })
    }

    fn expand(&self, text: &str) -> Result<String, DataSourceError> {
        let Some(name) = ENV_PATTERNS
            .iter()
            .find_map(|pattern| pattern.captures(text))
            .and_then(|caps| caps.name("name"))
            .map(|m| m.as_str())
        else {
            return Ok(text.to_string());
        };

        (self.lookup)(name).ok_or_else(|| DataSourceError::MissingEnvVar {
            name: name.to_string(),
            datasource: self.datasource.to_string(),
            path: self.path.to_path_buf(),
        })
    }
}
