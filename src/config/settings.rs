//! `praeparo.toml` settings.
//!
//! ```toml
//! datasource = "${PRAEPARO_DATASOURCE}"
//!
//! [pipeline]
//! ensure_non_empty_rows = true
//! sort_rows = true
//! png_scale = 3.0
//!
//! [worker]
//! path = "$HOME/.local/bin/praeparo-worker"
//! args = ["--log-level", "warn"]
//! timeout_secs = 60
//! ```
//!
//! String values that name paths or datasources may reference environment
//! variables as `$NAME` or `${NAME}`; they are expanded when read, not when
//! the file is parsed.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides the settings search when set.
pub const CONFIG_ENV_KEY: &str = "PRAEPARO_CONFIG";

const LOCAL_CONFIG: &str = "praeparo.toml";
const WORKER_PROGRAM: &str = "praeparo-worker";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Datasource used when neither the command line nor the visual names one.
    pub datasource: Option<String>,
    pub pipeline: PipelineSettings,
    pub worker: WorkerSettings,
}

/// Defaults for the pipeline invariants and outputs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub ensure_non_empty_rows: bool,
    pub ensure_values_present: bool,
    pub validate_define: bool,
    pub sort_rows: bool,
    pub png_scale: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ensure_non_empty_rows: false,
            ensure_values_present: false,
            validate_define: false,
            sort_rows: false,
            png_scale: 2.0,
        }
    }
}

/// How to launch the query worker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Executable; `praeparo-worker` on the `PATH` when unset.
    pub path: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Settings from `$PRAEPARO_CONFIG`, else the first existing of
    /// `./praeparo.toml` and `<config dir>/praeparo/config.toml`, else defaults.
    ///
    /// An explicit `$PRAEPARO_CONFIG` must exist.
    pub fn load() -> Result<Self, SettingsError> {
        if let Some(explicit) = env::var_os(CONFIG_ENV_KEY) {
            return Self::from_file(PathBuf::from(explicit));
        }

        let user_config = dirs::config_dir().map(|dir| dir.join("praeparo").join("config.toml"));
        let found = std::iter::once(PathBuf::from(LOCAL_CONFIG))
            .chain(user_config)
            .find(|candidate| candidate.is_file());

        match found {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn worker_path(&self) -> Result<PathBuf, SettingsError> {
        let raw = self.worker.path.as_deref().unwrap_or(WORKER_PROGRAM);
        expand_env_vars(raw).map(PathBuf::from)
    }

    pub fn default_datasource(&self) -> Result<Option<String>, SettingsError> {
        self.datasource.as_deref().map(expand_env_vars).transpose()
    }
}

/// Replace `$NAME` and `${NAME}` with values from the process environment.
pub fn expand_env_vars(input: &str) -> Result<String, SettingsError> {
    expand_with(input, |name| env::var(name).ok())
}

/// A lone `$`, or one followed by a non-identifier character, is kept as is.
fn expand_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, SettingsError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => (braced, after.len()),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if name.is_empty() && consumed == 0 {
            out.push('$');
        } else {
            let value = lookup(name).ok_or_else(|| SettingsError::MissingEnvVar(name.to_string()))?;
            out.push_str(&value);
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}
