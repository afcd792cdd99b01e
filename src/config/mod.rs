//! Configuration module for Praeparo.
//!
//! Handles settings files, credentials and environment variables.

mod credentials;
mod settings;

pub use credentials::{
    CredentialsError, PowerBiSettings, CLIENT_ID_ENV_KEY, CLIENT_SECRET_ENV_KEY, DATASET_ENV_KEY,
    DEFAULT_SCOPE, REFRESH_TOKEN_ENV_KEY, SCOPE_ENV_KEY, TENANT_ID_ENV_KEY, WORKSPACE_ENV_KEY,
};
pub use settings::{
    expand_env_vars, PipelineSettings, Settings, SettingsError, WorkerSettings, CONFIG_ENV_KEY,
};
