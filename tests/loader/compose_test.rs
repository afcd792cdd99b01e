use praeparo::loader::{ComposeResolver, LoadError, VisualLoader};
use praeparo::model::{Totals, Visual};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    fs::canonicalize(&path).unwrap()
}

#[test]
fn test_child_overrides_parent() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "base.yaml",
        r#"
title: Base
totals: row
style:
  font: Inter
  size: 12
tags: [a, b]
"#,
    );
    let child = write(
        dir.path(),
        "child.yaml",
        r#"
compose: base.yaml
title: Child
style:
  size: 14
tags: [c]
"#,
    );

    let merged = ComposeResolver::new().resolve(&child, &[]).unwrap();

    assert_eq!(merged["title"], json!("Child"));
    assert_eq!(merged["totals"], json!("row"));
    assert_eq!(merged["style"], json!({"font": "Inter", "size": 14}));
    assert_eq!(merged["tags"], json!(["c"]));
    assert!(!merged.contains_key("compose"));
}

#[test]
fn test_parents_merge_in_declared_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "first.yaml", "title: First\ndescription: from first\n");
    write(dir.path(), "shared/second.yaml", "title: Second\n");
    let child = write(
        dir.path(),
        "child.yaml",
        "compose:\n  - first.yaml\n  - shared/second.yaml\n",
    );

    let merged = ComposeResolver::new().resolve(&child, &[]).unwrap();

    assert_eq!(merged["title"], json!("Second"));
    assert_eq!(merged["description"], json!("from first"));
}

#[test]
fn test_nested_parent_paths_resolve_relative_to_parent() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "shared/root.yaml", "totals: row\n");
    write(dir.path(), "shared/base.yaml", "compose: root.yaml\ntitle: Base\n");
    let child = write(dir.path(), "visuals/child.yaml", "compose: ../shared/base.yaml\n");

    let merged = ComposeResolver::new().resolve(&child, &[]).unwrap();

    assert_eq!(merged["totals"], json!("row"));
    assert_eq!(merged["title"], json!("Base"));
}

#[test]
fn test_compose_cycle_reports_chain() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.yaml", "compose: b.yaml\n");
    let b = write(dir.path(), "b.yaml", "compose: a.yaml\n");

    let err = ComposeResolver::new().resolve(&a, &[]).unwrap_err();

    match err {
        LoadError::CompositionCycle { chain } => assert_eq!(chain, vec![a.clone(), b, a]),
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[test]
fn test_self_compose_is_a_cycle() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "self.yaml", "compose: self.yaml\n");

    let err = VisualLoader::new().load(&path).unwrap_err();

    assert!(matches!(err, LoadError::CompositionCycle { ref chain } if chain.len() == 2));
    assert!(err.to_string().contains(" -> "));
}

#[test]
fn test_missing_parent_is_io_error() {
    let dir = TempDir::new().unwrap();
    let child = write(dir.path(), "child.yaml", "compose: missing.yaml\n");

    let err = ComposeResolver::new().resolve(&child, &[]).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn test_invalid_compose_shape() {
    let dir = TempDir::new().unwrap();
    let number = write(dir.path(), "number.yaml", "compose: 5\n");
    let blank = write(dir.path(), "blank.yaml", "compose: [\"\"]\n");

    let resolver = ComposeResolver::new();
    assert!(matches!(
        resolver.resolve(&number, &[]),
        Err(LoadError::Shape { .. })
    ));
    assert!(matches!(
        resolver.resolve(&blank, &[]),
        Err(LoadError::Shape { .. })
    ));
}

#[test]
fn test_non_mapping_root_and_bad_yaml() {
    let dir = TempDir::new().unwrap();
    let list = write(dir.path(), "list.yaml", "- a\n- b\n");
    let broken = write(dir.path(), "broken.yaml", "title: [unclosed\n");

    let loader = VisualLoader::new();
    assert!(matches!(loader.load(&list), Err(LoadError::Shape { .. })));
    assert!(matches!(loader.load(&broken), Err(LoadError::Syntax { .. })));
}

#[test]
fn test_composed_matrix_loads() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "base.yaml",
        r#"
type: matrix
datasource: finance
totals: row
values:
  - id: Total Sales
    label: Sales
"#,
    );
    let child = write(
        dir.path(),
        "sales.yaml",
        r#"
compose: base.yaml
title: Sales by City
rows:
  - "{{dim.City}}"
"#,
    );

    let loaded = VisualLoader::new().load(&child).unwrap();

    assert_eq!(loaded.source, child);
    let Visual::Matrix(matrix) = &loaded.visual else {
        panic!("expected matrix");
    };
    assert_eq!(matrix.title(), Some("Sales by City"));
    assert_eq!(matrix.datasource(), Some("finance"));
    assert_eq!(matrix.totals(), Totals::Row);
    assert_eq!(matrix.values()[0].label(), "Sales");
}

#[test]
fn test_validation_runs_after_composition() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "base.yaml", "rows: [\"{{dim.City}}\"]\n");
    let child = write(dir.path(), "child.yaml", "compose: base.yaml\nvalues: []\n");

    let err = VisualLoader::new().load(&child).unwrap_err();
    assert!(matches!(err, LoadError::Validation { .. }));
}
