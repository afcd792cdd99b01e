use praeparo::loader::{LoadError, VisualLoader};
use praeparo::model::{FilterSpec, Layout, Visual};
use praeparo::validation::ValidationError;
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

const SALES: &str = r#"
title: Sales
parameters:
  Year: 2023
rows:
  - "{{dim.City}}"
values:
  - id: Total Sales
filters:
  - expression: "dim_calendar[Year] = {{Year}}"
"#;

#[test]
fn test_frame_resolves_children_in_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "children/sales.yaml", SALES);
    write(
        dir.path(),
        "children/margin.yaml",
        "rows: [\"{{dim.Region}}\"]\nvalues: [{id: Margin}]\n",
    );
    let frame_path = write(
        dir.path(),
        "overview.yaml",
        r#"
type: frame
title: Overview
layout: horizontal
showTitles: true
children:
  - ref: children/sales.yaml
    parameters:
      Year: 2024
    title: Sales 2024
  - ref: children/margin.yaml
"#,
    );

    let loaded = VisualLoader::new().load(&frame_path).unwrap();
    let Visual::Frame(frame) = &loaded.visual else {
        panic!("expected frame");
    };

    assert_eq!(frame.title(), Some("Overview"));
    assert_eq!(frame.layout(), Layout::Horizontal);
    assert!(frame.show_titles());
    assert_eq!(frame.children().len(), 2);

    let first = &frame.children()[0];
    assert!(first.source().ends_with("children/sales.yaml"));
    assert_eq!(first.parameters().get("Year").map(String::as_str), Some("2024"));
    let sales = first.visual().as_matrix().unwrap();
    assert_eq!(sales.title(), Some("Sales 2024"));
    assert_eq!(
        sales.filters(),
        &[FilterSpec::Expression("dim_calendar[Year] = 2024".to_string())]
    );

    let second = frame.children()[1].visual().as_matrix().unwrap();
    assert_eq!(second.title(), None);
    assert_eq!(second.values()[0].id(), "Margin");
}

#[test]
fn test_frame_child_cycle() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "outer.yaml",
        "type: frame\nchildren:\n  - ref: inner.yaml\n",
    );
    write(
        dir.path(),
        "inner.yaml",
        "type: frame\nchildren:\n  - ref: outer.yaml\n",
    );

    let err = VisualLoader::new()
        .load(&dir.path().join("outer.yaml"))
        .unwrap_err();

    match err {
        LoadError::CompositionCycle { chain } => {
            let names: Vec<_> = chain
                .iter()
                .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(names, vec!["outer.yaml", "inner.yaml", "outer.yaml"]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[test]
fn test_frame_child_may_repeat_without_cycle() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sales.yaml", SALES);
    let frame_path = write(
        dir.path(),
        "frame.yaml",
        r#"
type: frame
children:
  - ref: sales.yaml
  - ref: sales.yaml
    parameters:
      Year: 2022
"#,
    );

    let loaded = VisualLoader::new().load(&frame_path).unwrap();
    let frame = loaded.visual.as_frame().unwrap();
    assert_eq!(frame.children().len(), 2);
}

#[test]
fn test_nested_frames() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sales.yaml", SALES);
    write(
        dir.path(),
        "inner.yaml",
        "type: frame\nchildren:\n  - ref: sales.yaml\n",
    );
    let outer = write(
        dir.path(),
        "outer.yaml",
        "type: frame\nchildren:\n  - ref: inner.yaml\n",
    );

    let loaded = VisualLoader::new().load(&outer).unwrap();
    let frame = loaded.visual.as_frame().unwrap();
    let inner = frame.children()[0].visual().as_frame().unwrap();
    assert!(inner.children()[0].visual().as_matrix().is_some());
}

#[test]
fn test_missing_child_document() {
    let dir = TempDir::new().unwrap();
    let frame_path = write(
        dir.path(),
        "frame.yaml",
        "type: frame\nchildren:\n  - ref: missing.yaml\n",
    );

    let err = VisualLoader::new().load(&frame_path).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn test_frame_requires_children() {
    let dir = TempDir::new().unwrap();
    let empty = write(dir.path(), "empty.yaml", "type: frame\nchildren: []\n");
    let no_ref = write(
        dir.path(),
        "no_ref.yaml",
        "type: frame\nchildren:\n  - title: Orphan\n",
    );

    let loader = VisualLoader::new();
    assert!(matches!(
        loader.load(&empty),
        Err(LoadError::Validation {
            source: ValidationError::EmptyChildren,
            ..
        })
    ));
    assert!(matches!(
        loader.load(&no_ref),
        Err(LoadError::Validation {
            source: ValidationError::MissingChildRef { index: 0 },
            ..
        })
    ));
}

#[test]
fn test_child_validation_error_aborts_frame() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "bad.yaml", "rows: []\nvalues: [{id: Sales}]\n");
    let frame_path = write(
        dir.path(),
        "frame.yaml",
        "type: frame\nchildren:\n  - ref: bad.yaml\n",
    );

    let err = VisualLoader::new().load(&frame_path).unwrap_err();
    match err {
        LoadError::Validation { path, source } => {
            assert!(path.ends_with("bad.yaml"));
            assert_eq!(source, ValidationError::EmptyRows);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}
