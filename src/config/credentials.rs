//! Power BI service principal credentials.
//!
//! Supports configuration via environment variables:
//! - `PRAEPARO_PBI_TENANT_ID`: Azure AD tenant
//! - `PRAEPARO_PBI_CLIENT_ID`: Application (client) id
//! - `PRAEPARO_PBI_CLIENT_SECRET`: Client secret
//! - `PRAEPARO_PBI_REFRESH_TOKEN`: Refresh token
//! - `PRAEPARO_PBI_SCOPE`: OAuth scope (optional)

use std::env;

use serde::Serialize;

pub const TENANT_ID_ENV_KEY: &str = "PRAEPARO_PBI_TENANT_ID";
pub const CLIENT_ID_ENV_KEY: &str = "PRAEPARO_PBI_CLIENT_ID";
pub const CLIENT_SECRET_ENV_KEY: &str = "PRAEPARO_PBI_CLIENT_SECRET";
pub const REFRESH_TOKEN_ENV_KEY: &str = "PRAEPARO_PBI_REFRESH_TOKEN";
pub const SCOPE_ENV_KEY: &str = "PRAEPARO_PBI_SCOPE";
pub const DATASET_ENV_KEY: &str = "PRAEPARO_PBI_DATASET_ID";
pub const WORKSPACE_ENV_KEY: &str = "PRAEPARO_PBI_WORKSPACE_ID";

/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

/// Error type for credentials configuration.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Credentials forwarded to the execution worker.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PowerBiSettings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub scope: String,
}

impl std::fmt::Debug for PowerBiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerBiSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

impl PowerBiSettings {
    /// Load credentials from the process environment.
    pub fn from_env() -> Result<Self, CredentialsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load credentials through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| CredentialsError::MissingEnvVar(key.to_string()))
        };

        Ok(Self {
            tenant_id: required(TENANT_ID_ENV_KEY)?,
            client_id: required(CLIENT_ID_ENV_KEY)?,
            client_secret: required(CLIENT_SECRET_ENV_KEY)?,
            refresh_token: required(REFRESH_TOKEN_ENV_KEY)?,
            scope: lookup(SCOPE_ENV_KEY)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
        })
    }
}
