use async_trait::async_trait;
use praeparo::data::{Dataset, Record, MOCK_ROW_COUNT};
use praeparo::dax::DaxQueryPlan;
use praeparo::loader::VisualLoader;
use praeparo::model::{MatrixVisual, Visual};
use praeparo::pipeline::{
    DaxMatrixPlanner, ExecutionClient, ExecutionContext, ExecutionError, ExecutionRequest,
    MatrixDataProvider, MatrixQueryPlanner, OutputEmissionError, OutputKind, OutputTarget,
    Pipeline, PipelineError, PipelineOptions, PipelineStage, PlannerProvider,
};
use praeparo::render::RenderError;
use praeparo::template::FieldReference;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn load(path: &Path) -> (PathBuf, Visual) {
    let loaded = VisualLoader::new().load(path).unwrap();
    (loaded.source, loaded.visual)
}

const SALES: &str = r#"
title: Revenue by Month
rows:
  - "{{dim_calendar.month}}"
values:
  - id: Total Sales
    label: Sales
"#;

const MARGIN: &str = r#"
rows:
  - "{{dim_region.region}}"
values:
  - id: Margin
    format: "percent:1"
"#;

const OVERVIEW: &str = r#"
type: frame
title: Overview
children:
  - ref: sales.yaml
  - ref: margin.yaml
"#;

#[derive(Debug, Clone, PartialEq)]
struct Call {
    dataset_id: String,
    workspace_id: Option<String>,
    statement: String,
    has_credentials: bool,
}

#[derive(Default)]
struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    fail: bool,
}

#[async_trait]
impl ExecutionClient for RecordingClient {
    async fn execute_matrix(&self, request: ExecutionRequest<'_>) -> Result<Dataset, ExecutionError> {
        self.calls.lock().unwrap().push(Call {
            dataset_id: request.dataset_id.to_string(),
            workspace_id: request.workspace_id.map(str::to_string),
            statement: request.plan.statement.clone(),
            has_credentials: request.credentials.is_some(),
        });
        if self.fail {
            return Err("dataset offline".into());
        }
        let mut row = Record::new();
        for field in request.row_fields {
            row.insert(field.placeholder(), json!("remote"));
        }
        for value in request.visual.values() {
            row.insert(value.label().to_string(), json!(42));
        }
        Ok(Dataset::new(vec![row], request.row_fields.to_vec()))
    }
}

fn rows_provider(rows: Vec<Record>) -> MatrixDataProvider {
    Arc::new(
        move |_: &MatrixVisual,
              row_fields: &[FieldReference],
              _: &DaxQueryPlan|
              -> Result<Dataset, ExecutionError> {
            Ok(Dataset::new(rows.clone(), row_fields.to_vec()))
        },
    )
}

fn pipeline_with(planner: DaxMatrixPlanner) -> Pipeline {
    let planner: Arc<dyn MatrixQueryPlanner> = Arc::new(planner);
    Pipeline::with_planners(PlannerProvider::new([("matrix", planner)]))
}

#[test]
fn test_matrix_with_mock_data_writes_html() {
    let dir = TempDir::new().unwrap();
    let (source, visual) = load(&write(dir.path(), "sales.yaml", SALES));
    let html = dir.path().join("build/nested/sales.html");

    let options = PipelineOptions {
        outputs: vec![OutputTarget::html(&html)],
        ensure_non_empty_rows: true,
        ensure_values_present: true,
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::with_planners(PlannerProvider::mock());
    let result = pipeline
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap();

    assert_eq!(result.case_key.as_deref(), Some("sales"));
    assert_eq!(result.datasets[0].len(), MOCK_ROW_COUNT);
    assert_eq!(result.outputs.len(), 1);
    assert_eq!(result.outputs[0].kind, OutputKind::Html);
    assert!(result.output_failures.is_empty());

    let written = fs::read_to_string(&html).unwrap();
    assert!(written.contains("<h1>Revenue by Month</h1>"));
    assert!(written.contains("Month 1"));
}

#[test]
fn test_html_kept_when_png_fails() {
    let dir = TempDir::new().unwrap();
    let (source, visual) = load(&write(dir.path(), "sales.yaml", SALES));
    let html = dir.path().join("out/sales.html");
    let png = dir.path().join("out/sales.png");

    let options = PipelineOptions {
        outputs: vec![OutputTarget::html(&html), OutputTarget::png(&png, Some(3.0))],
        ..PipelineOptions::default()
    };
    let result = Pipeline::with_planners(PlannerProvider::mock())
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap();

    assert!(html.is_file());
    assert!(!png.exists());
    assert_eq!(result.outputs.len(), 1);
    assert_eq!(result.outputs[0].path, html);
    assert!(result.has_output_failures());
    match &result.output_failures[0] {
        OutputEmissionError::Write { kind, path, source } => {
            assert_eq!(*kind, OutputKind::Png);
            assert_eq!(path, &png);
            assert!(matches!(source, RenderError::BackendUnavailable(_)));
        }
        other => panic!("unexpected failure {other:?}"),
    }
}

#[test]
fn test_frame_children_run_in_order_with_case_keys() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sales.yaml", SALES);
    write(dir.path(), "margin.yaml", MARGIN);
    let (source, visual) = load(&write(dir.path(), "overview.yaml", OVERVIEW));
    let html = dir.path().join("overview.html");

    let options = PipelineOptions {
        outputs: vec![OutputTarget::html(&html)],
        ..PipelineOptions::default()
    };
    let result = Pipeline::with_planners(PlannerProvider::mock())
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap();

    let keys: Vec<_> = result
        .children
        .iter()
        .map(|child| child.case_key.clone().unwrap())
        .collect();
    assert_eq!(keys, vec!["overview__revenue_by_month", "overview__margin"]);

    assert!(result.plans.is_empty());
    assert_eq!(result.datasets.len(), 2);
    assert_eq!(result.figure.sections.len(), 2);
    assert_eq!(result.outputs.len(), 1);
    assert!(result.children.iter().all(|child| child.outputs.is_empty()));
    assert!(result.children.iter().all(|child| child.plans.len() == 1));
}

#[test]
fn test_case_override_routes_single_child_to_provider() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sales.yaml", SALES);
    write(dir.path(), "margin.yaml", MARGIN);
    let (source, visual) = load(&write(dir.path(), "overview.yaml", OVERVIEW));

    let mut row = Record::new();
    row.insert("dim_region.region".to_string(), json!("North"));
    row.insert("Margin".to_string(), json!(0.25));
    let planner = DaxMatrixPlanner::new(Arc::new(RecordingClient::default()))
        .with_provider("fixture", rows_provider(vec![row]));

    let mut options = PipelineOptions::default();
    options.data.provider_key = Some("mock".to_string());
    options
        .data
        .provider_case_overrides
        .insert("overview__margin".to_string(), "fixture".to_string());

    let result = pipeline_with(planner)
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap();

    assert_eq!(result.datasets[0].len(), MOCK_ROW_COUNT);
    assert_eq!(result.datasets[1].len(), 1);
    assert_eq!(result.datasets[1].rows[0]["dim_region.region"], json!("North"));
}

#[test]
fn test_dataset_override_executes_through_client() {
    let dir = TempDir::new().unwrap();
    let (source, visual) = load(&write(dir.path(), "sales.yaml", SALES));
    let client = Arc::new(RecordingClient::default());

    let mut options = PipelineOptions::default();
    options.data.dataset_id = Some("ds-override".to_string());
    options.data.workspace_id = Some("ws-override".to_string());
    options.data.provider_key = Some("mock".to_string());
    options.ensure_values_present = true;

    let result = pipeline_with(DaxMatrixPlanner::new(client.clone()))
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap();

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].dataset_id, "ds-override");
    assert_eq!(calls[0].workspace_id.as_deref(), Some("ws-override"));
    assert!(!calls[0].has_credentials);
    assert_eq!(calls[0].statement, result.plans[0].statement);
    assert_eq!(result.datasets[0].rows[0]["Sales"], json!(42));
}

#[test]
fn test_named_datasource_supplies_dataset_and_credentials() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "datasources/finance.yaml",
        r#"
type: powerbi
datasetId: ds-finance
workspaceId: ws-finance
tenantId: tenant
clientId: client
clientSecret: secret
refreshToken: token
"#,
    );
    let (source, visual) = load(&write(
        dir.path(),
        "visuals/sales.yaml",
        &format!("datasource: finance\n{SALES}"),
    ));
    let client = Arc::new(RecordingClient::default());

    pipeline_with(DaxMatrixPlanner::new(client.clone()))
        .execute(
            &visual,
            &ExecutionContext::new(&source, PipelineOptions::default()),
        )
        .unwrap();

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].dataset_id, "ds-finance");
    assert_eq!(calls[0].workspace_id.as_deref(), Some("ws-finance"));
    assert!(calls[0].has_credentials);
}

#[test]
fn test_missing_datasource_fails_acquisition() {
    let dir = TempDir::new().unwrap();
    let (source, visual) = load(&write(
        dir.path(),
        "sales.yaml",
        &format!("datasource: praeparo_missing_ds\n{SALES}"),
    ));

    let err = pipeline_with(DaxMatrixPlanner::new(Arc::new(RecordingClient::default())))
        .execute(
            &visual,
            &ExecutionContext::new(&source, PipelineOptions::default()),
        )
        .unwrap_err();

    assert!(matches!(err, PipelineError::DataSource(_)));
    assert_eq!(err.stage(), PipelineStage::DatasetAcquisition);
}

#[test]
fn test_client_error_passes_through() {
    let dir = TempDir::new().unwrap();
    let (source, visual) = load(&write(dir.path(), "sales.yaml", SALES));
    let client = Arc::new(RecordingClient {
        fail: true,
        ..RecordingClient::default()
    });

    let mut options = PipelineOptions::default();
    options.data.dataset_id = Some("ds".to_string());
    let err = pipeline_with(DaxMatrixPlanner::new(client))
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap_err();

    match err {
        PipelineError::Execution(source) => assert_eq!(source.to_string(), "dataset offline"),
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pending_acquisition_inside_runtime_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (source, visual) = load(&write(dir.path(), "sales.yaml", SALES));

    let mut options = PipelineOptions::default();
    options.data.dataset_id = Some("ds".to_string());
    let err = pipeline_with(DaxMatrixPlanner::new(Arc::new(RecordingClient::default())))
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap_err();

    assert!(matches!(err, PipelineError::AsyncContext));
}

#[test]
fn test_invariants_and_sorting() {
    let dir = TempDir::new().unwrap();
    let (source, visual) = load(&write(dir.path(), "sales.yaml", SALES));

    let month = |name: &str, sales: serde_json::Value| {
        let mut row = Record::new();
        row.insert("dim_calendar.month".to_string(), json!(name));
        row.insert("Sales".to_string(), sales);
        row
    };

    let unsorted = DaxMatrixPlanner::new(Arc::new(RecordingClient::default())).with_provider(
        "fixture",
        rows_provider(vec![month("Mar", json!(3)), month("Feb", json!(2))]),
    );
    let mut options = PipelineOptions {
        sort_rows: true,
        ensure_values_present: true,
        ..PipelineOptions::default()
    };
    options.data.provider_key = Some("fixture".to_string());
    let result = pipeline_with(unsorted)
        .execute(&visual, &ExecutionContext::new(&source, options.clone()))
        .unwrap();
    assert_eq!(result.datasets[0].rows[0]["dim_calendar.month"], json!("Feb"));

    let null_value = DaxMatrixPlanner::new(Arc::new(RecordingClient::default()))
        .with_provider("fixture", rows_provider(vec![month("Jan", json!(null))]));
    let err = pipeline_with(null_value)
        .execute(&visual, &ExecutionContext::new(&source, options.clone()))
        .unwrap_err();
    assert_eq!(err.stage(), PipelineStage::InvariantChecking);

    let empty = DaxMatrixPlanner::new(Arc::new(RecordingClient::default()))
        .with_provider("fixture", rows_provider(Vec::new()));
    options.ensure_non_empty_rows = true;
    let err = pipeline_with(empty)
        .execute(&visual, &ExecutionContext::new(&source, options))
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvariantViolation { .. }));
}

#[test]
fn test_nested_frame_child_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sales.yaml", SALES);
    write(
        dir.path(),
        "inner.yaml",
        "type: frame\nchildren:\n  - ref: sales.yaml\n",
    );
    let (source, visual) = load(&write(
        dir.path(),
        "outer.yaml",
        "type: frame\nchildren:\n  - ref: sales.yaml\n  - ref: inner.yaml\n",
    ));

    let err = Pipeline::with_planners(PlannerProvider::mock())
        .execute(
            &visual,
            &ExecutionContext::new(&source, PipelineOptions::default()),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::UnsupportedChild {
            index: 2,
            visual_type: "frame"
        }
    ));
}
