use praeparo::config::{DEFAULT_SCOPE, TENANT_ID_ENV_KEY};
use praeparo::datasource::{resolve_datasource_with, DataSourceError, DataSourceKind};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const FINANCE: &str = r#"
type: powerbi
datasetId: ds-finance
workspaceId: ws-finance
clientId: client-1
clientSecret: ${env:FINANCE_SECRET}
refreshToken: env:FINANCE_TOKEN
"#;

#[test]
fn test_bare_name_found_in_ancestor_datasources_dir() {
    let dir = TempDir::new().unwrap();
    let definition = write(dir.path(), "datasources/finance.yaml", FINANCE);
    let visual = write(dir.path(), "visuals/reports/sales.yaml", "");

    let lookup = env(&[
        ("FINANCE_SECRET", "s3cret"),
        ("FINANCE_TOKEN", "tok"),
        (TENANT_ID_ENV_KEY, "tenant-from-env"),
    ]);
    let resolved = resolve_datasource_with(Some("finance"), &visual, &lookup).unwrap();

    assert_eq!(resolved.name, "finance");
    assert_eq!(resolved.kind, DataSourceKind::PowerBi);
    assert_eq!(resolved.dataset_id.as_deref(), Some("ds-finance"));
    assert_eq!(resolved.workspace_id.as_deref(), Some("ws-finance"));
    assert_eq!(resolved.source_path.as_deref(), Some(definition.as_path()));

    let settings = resolved.settings.unwrap();
    assert_eq!(settings.tenant_id, "tenant-from-env");
    assert_eq!(settings.client_id, "client-1");
    assert_eq!(settings.client_secret, "s3cret");
    assert_eq!(settings.refresh_token, "tok");
    assert_eq!(settings.scope, DEFAULT_SCOPE);
}

#[test]
fn test_datasources_dir_wins_over_sibling_file() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "datasources/finance.yml",
        "datasetId: from-dir\ntenantId: t\nclientId: c\nclientSecret: s\nrefreshToken: r\n",
    );
    write(
        dir.path(),
        "finance.yaml",
        "datasetId: from-root\ntenantId: t\nclientId: c\nclientSecret: s\nrefreshToken: r\n",
    );
    let visual = write(dir.path(), "sales.yaml", "");

    let resolved = resolve_datasource_with(Some("finance"), &visual, &env(&[])).unwrap();
    assert_eq!(resolved.dataset_id.as_deref(), Some("from-dir"));
}

#[test]
fn test_relative_path_reference() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "shared/ds.yaml",
        "dataset_id: rel\ntenant_id: t\nclient_id: c\nclient_secret: s\nrefresh_token: r\nscope: custom\n",
    );
    let visual = write(dir.path(), "visuals/sales.yaml", "");

    let resolved = resolve_datasource_with(Some("../shared/ds.yaml"), &visual, &env(&[])).unwrap();
    assert_eq!(resolved.dataset_id.as_deref(), Some("rel"));
    assert_eq!(resolved.settings.unwrap().scope, "custom");
}

#[test]
fn test_mock_name_without_definition() {
    let dir = TempDir::new().unwrap();
    let visual = write(dir.path(), "sales.yaml", "");

    let resolved = resolve_datasource_with(Some("Mock"), &visual, &env(&[])).unwrap();
    assert!(resolved.is_mock());
    assert!(resolved.settings.is_none());
}

#[test]
fn test_unknown_name_reports_first_candidate() {
    let dir = TempDir::new().unwrap();
    let visual = write(dir.path(), "visuals/sales.yaml", "");

    let err = resolve_datasource_with(Some("praeparo_missing_ds"), &visual, &env(&[]))
        .unwrap_err();
    match err {
        DataSourceError::NotFound { candidate } => {
            assert_eq!(
                candidate,
                dir.path().join("visuals").join("praeparo_missing_ds.yaml")
            );
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn test_missing_env_placeholder() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "finance.yaml", FINANCE);
    let visual = write(dir.path(), "sales.yaml", "");

    let err = resolve_datasource_with(Some("finance"), &visual, &env(&[])).unwrap_err();
    assert!(matches!(
        err,
        DataSourceError::MissingEnvVar { ref name, .. } if name == "FINANCE_SECRET"
    ));
}

#[test]
fn test_missing_required_field_names_env_key() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "finance.yaml", "datasetId: ds\n");
    let visual = write(dir.path(), "sales.yaml", "");

    let err = resolve_datasource_with(Some("finance"), &visual, &env(&[])).unwrap_err();
    match err {
        DataSourceError::MissingField { field, env_key, .. } => {
            assert_eq!(field, "tenant_id");
            assert_eq!(env_key, TENANT_ID_ENV_KEY);
        }
        other => panic!("expected missing field, got {other:?}"),
    }
}

#[test]
fn test_unknown_definition_keys_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "finance.yaml", "datasetId: ds\nserver: nope\n");
    let visual = write(dir.path(), "sales.yaml", "");

    let err = resolve_datasource_with(Some("finance"), &visual, &env(&[])).unwrap_err();
    assert!(matches!(err, DataSourceError::Invalid { .. }));
}
