//! FILENAME: pivot-engine/tests/test_model.rs
//! Integration tests for building and augmenting pivot models from grouped records.

mod common;

use common::{group_by, measure, number, RecordSource, SalesFixture, SALES};
use pivot_engine::{
    create_data, evaluate_expression, inject_expressions, is_pivot_config_changed, numeric_sum,
    sort_pivot_data, AggregationType, DataResource, DefaultTransform, Evaluation,
    ExpressionOperation, OperandResolver, PivotConfig, PivotDataHeader, PivotExpression,
    PivotSort, PivotSortList, PivotSortValue, PivotStemConfig, PivotStemData,
};
use pivot_values::{Constraint, DataValue};
use pretty_assertions::assert_eq;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn build(stem: PivotStemConfig, source: &RecordSource) -> PivotStemData {
    let mut config = PivotConfig::default_for_stems(0);
    config.stems_configs.push(stem);
    let mut data = create_data(&config, source, &DefaultTransform);
    assert_eq!(data.data.len(), 1);
    data.data.remove(0)
}

fn region_by_quarter() -> PivotStemConfig {
    PivotStemConfig {
        row_attributes: vec![group_by("region")],
        column_attributes: vec![group_by("quarter")],
        value_attributes: vec![measure("sales", AggregationType::Sum)],
    }
}

fn titles(headers: &[PivotDataHeader]) -> Vec<&str> {
    headers.iter().map(|h| h.title.as_str()).collect()
}

/// Sums the first matrix column for the leaves of header operands.
struct FirstColumn<'a>(&'a PivotStemData);

impl OperandResolver for FirstColumn<'_> {
    fn resolve_headers(&self, headers: &[PivotDataHeader]) -> Evaluation {
        let rows: Vec<usize> = headers.iter().flat_map(|h| h.target_indexes()).collect();
        Evaluation {
            value: numeric_sum(&self.0.values, &rows, &[0]),
            indexes: rows,
            ..Default::default()
        }
    }
}

// ============================================================================
// BUILD TESTS
// ============================================================================

#[test]
fn test_rows_and_columns_from_records() {
    let stem = build(region_by_quarter(), &SalesFixture::source());

    assert_eq!(titles(&stem.row_headers), vec!["North", "South", "East"]);
    assert_eq!(titles(&stem.column_headers), vec!["Q1", "Q2"]);
    assert_eq!(stem.value_titles, vec!["sum Sales"]);
    assert_eq!(stem.values_constraints, vec![Some(Constraint::number())]);
    assert_eq!(stem.row_headers[0].constraint, Some(Constraint::Text));
    assert_eq!(stem.row_headers[0].attribute_name.as_deref(), Some("Region"));
    assert_eq!(
        stem.values,
        vec![
            vec![number(18000.0), number(21000.0)],
            vec![number(26000.0), number(27000.0)],
            vec![number(16000.0), number(19500.0)],
        ]
    );
    assert_eq!(stem.data_resources[2][1].len(), 2);
    assert!(stem.validate().is_ok());
}

#[test]
fn test_target_index_bijection() {
    let stem = build(
        PivotStemConfig {
            row_attributes: vec![group_by("region"), group_by("product")],
            column_attributes: vec![group_by("quarter")],
            value_attributes: vec![
                measure("sales", AggregationType::Sum),
                measure("quantity", AggregationType::Sum),
            ],
        },
        &SalesFixture::source(),
    );

    let mut rows: Vec<usize> = stem.row_headers.iter().flat_map(|h| h.target_indexes()).collect();
    let mut columns: Vec<usize> = stem.column_headers.iter().flat_map(|h| h.target_indexes()).collect();
    rows.sort_unstable();
    columns.sort_unstable();
    assert_eq!(rows, (0..6).collect::<Vec<_>>());
    assert_eq!(columns, (0..4).collect::<Vec<_>>());

    assert_eq!(stem.values.len(), 6);
    assert!(stem.values.iter().all(|row| row.len() == 4));
    assert!(stem.has_additional_column_level);
    // North / Widget: Q1 sales, Q1 quantity, Q2 sales, Q2 quantity
    assert_eq!(stem.values[0], vec![number(10000.0), number(100.0), number(12000.0), number(120.0)]);
    assert!(stem.column_headers[1].children()[1].is_value_header);
}

#[test]
fn test_count_counts_records() {
    let mut config = region_by_quarter();
    config.value_attributes = vec![measure("sales", AggregationType::Count)];
    let stem = build(config, &SalesFixture::source());
    assert_eq!(stem.values[0], vec![number(2.0), number(2.0)]);
    assert_eq!(stem.value_titles, vec!["count Sales"]);
}

#[test]
fn test_merge_stems_from_json_config() {
    let json = r#"{
        "version": "1",
        "mergeTables": true,
        "stemsConfigs": [
            {
                "rowAttributes": [{"resourceId": "sales", "attributeId": "region"}],
                "valueAttributes": [{"resourceId": "sales", "attributeId": "sales", "aggregation": "sum"}]
            },
            {
                "rowAttributes": [{"resourceId": "sales", "attributeId": "region"}],
                "valueAttributes": [{"resourceId": "sales", "attributeId": "sales", "aggregation": "sum"}]
            }
        ]
    }"#;
    let config = PivotConfig::from_json(json).unwrap();
    let extra = vec![DataResource::new("x1", SALES)
        .with_value("region", "West")
        .with_value("sales", 500.0)];
    let source = SalesFixture::source().with_stem(extra);

    let data = create_data(&config, &source, &DefaultTransform);
    assert_eq!(data.data.len(), 1);
    assert!(data.able_to_merge);
    let stem = &data.data[0];
    assert_eq!(titles(&stem.row_headers), vec!["North", "South", "East", "West"]);
    assert_eq!(stem.values[3], vec![number(500.0)]);
    assert_eq!(stem.value_titles.len(), 1);
}

#[test]
fn test_shape_mismatch_is_not_merged() {
    let mut config = PivotConfig::default_for_stems(0);
    config.stems_configs.push(region_by_quarter());
    config.stems_configs.push(PivotStemConfig {
        row_attributes: vec![group_by("region"), group_by("product")],
        column_attributes: vec![group_by("quarter")],
        value_attributes: vec![measure("sales", AggregationType::Sum)],
    });
    let source = SalesFixture::source().with_stem(SalesFixture::records());

    let data = create_data(&config, &source, &DefaultTransform);
    assert_eq!(data.data.len(), 2);
    assert!(!data.able_to_merge);
    assert_eq!(data.data[1].row_headers[0].children().len(), 2);
}

#[test]
fn test_unknown_attribute_falls_back() {
    let mut config = region_by_quarter();
    config.row_attributes = vec![group_by("missing")];
    let stem = build(config, &SalesFixture::source());
    assert_eq!(titles(&stem.row_headers), vec![""]);
    assert_eq!(stem.row_headers[0].constraint, Some(Constraint::Unknown));
    assert_eq!(stem.row_headers[0].attribute_name, None);
}

// ============================================================================
// AUGMENTATION TESTS
// ============================================================================

#[test]
fn test_sort_by_summary_then_inject_expression() {
    let mut config = region_by_quarter();
    config.row_attributes[0] = group_by("region")
        .with_sort(PivotSort {
            list: Some(PivotSortList {
                value_title: "sum Sales".to_string(),
                values: vec![PivotSortValue { title: String::new(), is_summary: true }],
            }),
            asc: false,
            ..Default::default()
        })
        .with_expression(
            PivotExpression::new("North + South", ExpressionOperation::Add)
                .header("North")
                .header("South"),
        );
    let stem = build(config, &SalesFixture::source());

    let sorted = sort_pivot_data(stem);
    // totals: South 53000, North 39000, East 35500
    assert_eq!(titles(&sorted.row_headers), vec!["South", "North", "East"]);

    let augmented = inject_expressions(sorted);
    let owner = &augmented.row_headers[1];
    assert_eq!(owner.title, "North");
    assert_eq!(owner.expressions.len(), 1);

    let evaluation = evaluate_expression(&owner.expressions[0], &FirstColumn(&augmented));
    assert_eq!(evaluation.value, 44000.0);
    assert_eq!(evaluation.indexes, vec![0, 1]);
}

#[test]
fn test_augmentation_is_idempotent() {
    let stem = build(region_by_quarter(), &SalesFixture::source());
    let once = inject_expressions(sort_pivot_data(stem.clone()));
    let twice = inject_expressions(sort_pivot_data(stem));
    assert_eq!(once, twice);
    assert_eq!(titles(&once.row_headers), vec!["East", "North", "South"]);
}

#[test]
fn test_config_change_detection() {
    let mut previous = PivotConfig::default_for_stems(0);
    previous.stems_configs.push(region_by_quarter());

    let mut current = previous.clone();
    current.stems_configs[0].row_attributes[0].show_header = true;
    assert!(!is_pivot_config_changed(&previous, &current));

    current.stems_configs[0].value_attributes[0].aggregation = AggregationType::Avg;
    assert!(is_pivot_config_changed(&previous, &current));
}

#[test]
fn test_join_values_are_lists() {
    let mut config = region_by_quarter();
    config.value_attributes = vec![measure("product", AggregationType::Join)];
    let stem = build(config, &SalesFixture::source());
    assert_eq!(
        stem.values[0][0],
        DataValue::List(vec![DataValue::text("Widget"), DataValue::text("Gadget")])
    );
}
