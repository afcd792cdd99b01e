use insta::assert_snapshot;
use praeparo::dax::{compile_matrix, compile_visual};
use praeparo::model::MatrixVisual;
use praeparo::template::extract_field_references;
use serde_json::{json, Value};

fn matrix(document: Value) -> MatrixVisual {
    MatrixVisual::from_value(&document).unwrap()
}

#[test]
fn test_single_row_single_value() {
    let visual = matrix(json!({
        "rows": ["{{dim.City}}"],
        "values": [{"id": "Total Sales", "label": "Sales"}],
    }));
    let plan = compile_visual(&visual).unwrap();

    assert_snapshot!(plan.statement, @r#"
    EVALUATE
    SUMMARIZECOLUMNS(
        dim[City],
        "Sales", [Total Sales]
    )
    "#);
    assert_eq!(plan.values, vec!["[Total Sales]".to_string()]);
    assert_eq!(plan.define, None);
}

#[test]
fn test_include_filter_wraps_calculatetable() {
    let visual = matrix(json!({
        "rows": ["{{dim.City}}"],
        "values": [{"id": "Total Sales", "label": "Sales"}],
        "filters": [{"field": "dim.City", "include": ["Seattle", "Portland"]}],
    }));
    let plan = compile_visual(&visual).unwrap();

    assert_snapshot!(plan.statement, @r#"
    EVALUATE
    CALCULATETABLE(
        SUMMARIZECOLUMNS(
            dim[City],
            "Sales", [Total Sales]
        ),
        dim[City] IN { "Seattle", "Portland" }
    )
    "#);
}

#[test]
fn test_percent_of_column_total() {
    let visual = matrix(json!({
        "rows": ["{{dim_region.Region}}", "{{dim_calendar.Month}}"],
        "values": [{"id": "Revenue", "show_as": "Percent of column total"}],
    }));
    let plan = compile_visual(&visual).unwrap();

    assert_snapshot!(plan.statement, @r#"
    EVALUATE
    SUMMARIZECOLUMNS(
        dim_region[Region],
        dim_calendar[Month],
        "Revenue", DIVIDE([Revenue], CALCULATE([Revenue], REMOVEFILTERS(dim_region), REMOVEFILTERS(dim_calendar[Month])))
    )
    "#);
}

#[test]
fn test_percent_of_column_total_single_row_field() {
    let visual = matrix(json!({
        "rows": ["{{dim.City}}"],
        "values": [{"id": "[Revenue]", "label": "Share", "show_as": "percent of column total"}],
    }));
    let plan = compile_visual(&visual).unwrap();

    assert!(plan.statement.contains(
        "\"Share\", DIVIDE([Revenue], CALCULATE([Revenue], REMOVEFILTERS(dim[City])))"
    ));
}

#[test]
fn test_define_and_mixed_filters() {
    let visual = matrix(json!({
        "define": "\n  MEASURE 'Sales'[Margin] = [Revenue] - [Cost]\n",
        "rows": ["{{dim.City}}", "{{ dim.City | upper }} / {{Channel}}"],
        "values": [
            {"id": "Revenue"},
            {"id": "Margin", "label": "Say \"Margin\""},
        ],
        "filters": [
            {"expression": "dim_calendar[Year] = 2024"},
            {"field": "dim.Channel", "include": ["Web", "O\"Brien", "Web"]},
        ],
    }));
    let plan = compile_visual(&visual).unwrap();

    assert_snapshot!(plan.statement, @r#"
    DEFINE
    MEASURE 'Sales'[Margin] = [Revenue] - [Cost]

    EVALUATE
    CALCULATETABLE(
        SUMMARIZECOLUMNS(
            dim[City],
            [Channel],
            "Revenue", [Revenue],
            "Say ""Margin""", [Margin]
        ),
        dim_calendar[Year] = 2024,
        dim[Channel] IN { "Web", "O""Brien" }
    )
    "#);
    assert_eq!(
        plan.define.as_deref(),
        Some("MEASURE 'Sales'[Margin] = [Revenue] - [Cost]")
    );
}

#[test]
fn test_blank_define_is_omitted() {
    let visual = matrix(json!({
        "define": "   \n  ",
        "rows": ["{{dim.City}}"],
        "values": [{"id": "Revenue"}],
    }));
    let plan = compile_visual(&visual).unwrap();
    assert!(plan.statement.starts_with("EVALUATE\n"));
    assert_eq!(plan.define, None);
}

#[test]
fn test_compile_is_deterministic() {
    let visual = matrix(json!({
        "rows": ["{{dim.City}}", "{{dim.Region}}"],
        "values": [{"id": "Revenue"}, {"id": "Cost"}],
        "filters": [{"expression": "dim[Active] = TRUE()"}],
    }));
    let rows = extract_field_references(visual.row_templates()).unwrap();

    let first = compile_matrix(&visual, &rows);
    let second = compile_matrix(&visual, &rows);
    assert_eq!(first, second);
}

#[test]
fn test_explicit_row_fields_control_order() {
    let visual = matrix(json!({
        "rows": ["{{dim.City}}", "{{dim.Region}}"],
        "values": [{"id": "Revenue"}],
    }));
    let mut rows = extract_field_references(visual.row_templates()).unwrap();
    rows.reverse();

    let plan = compile_matrix(&visual, &rows);
    let region = plan.statement.find("dim[Region]").unwrap();
    let city = plan.statement.find("dim[City]").unwrap();
    assert!(region < city);
}

#[test]
fn test_invalid_placeholder_fails_compilation() {
    let visual = matrix(json!({
        "rows": ["{{dim.}}"],
        "values": [{"id": "Revenue"}],
    }));
    assert!(compile_visual(&visual).is_err());
}
