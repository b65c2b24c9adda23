//! FILENAME: table-engine/tests/common/mod.rs
//! Hand-built pivot models and grid checks shared by the layout tests.

#![allow(dead_code)]

use pivot_engine::{
    ExpressionOperation, ExpressionPosition, PivotDataHeader, PivotDimensionConfig,
    PivotExpression, PivotStemData, PivotTransform, SummaryHeader,
};
use pivot_values::DataValue;
use table_engine::PivotTable;

// ============================================================================
// MODEL BUILDERS
// ============================================================================

pub fn numbers(rows: &[&[f64]]) -> Vec<Vec<DataValue>> {
    rows.iter()
        .map(|r| r.iter().map(|v| DataValue::Number(*v)).collect())
        .collect()
}

/// Leaves with consecutive target indexes starting at `start`.
pub fn leaves(titles: &[&str], start: usize) -> Vec<PivotDataHeader> {
    titles
        .iter()
        .enumerate()
        .map(|(i, t)| PivotDataHeader::leaf(*t, start + i))
        .collect()
}

/// Groups of leaves; target indexes continue across groups.
pub fn groups(spec: &[(&str, &[&str])]) -> Vec<PivotDataHeader> {
    let mut next = 0;
    spec.iter()
        .map(|(title, children)| {
            let header = PivotDataHeader::group(*title, leaves(children, next));
            next += children.len();
            header
        })
        .collect()
}

pub fn levels(show_sums: &[bool]) -> Vec<PivotDimensionConfig> {
    show_sums.iter().map(|s| PivotDimensionConfig::with_sums(*s)).collect()
}

/// Single value series over `row_headers` x `column_headers`.
pub fn stem(
    row_headers: Vec<PivotDataHeader>,
    rows_config: Vec<PivotDimensionConfig>,
    column_headers: Vec<PivotDataHeader>,
    columns_config: Vec<PivotDimensionConfig>,
    values: Vec<Vec<DataValue>>,
) -> PivotStemData {
    PivotStemData {
        row_headers,
        column_headers,
        value_titles: vec!["V".to_string()],
        values,
        rows_config,
        columns_config,
        ..Default::default()
    }
}

/// Rows A(a1..a3), B(a2, a3), C(a2..a4) with sums on both levels and two
/// expandable expressions: "A + B" on the first level, "a2 * a3" on the second.
/// Columns X(x1, x2), Y(x2..x4).
pub fn expression_stem() -> PivotStemData {
    let mut rows_config = levels(&[true, true]);
    rows_config[0].expressions.push(
        PivotExpression::new("A + B", ExpressionOperation::Add)
            .header("A")
            .header("B")
            .at(ExpressionPosition::BeforeHeader)
            .expandable(true),
    );
    rows_config[1].expressions.push(
        PivotExpression::new("a2 * a3", ExpressionOperation::Multiply)
            .header("a2")
            .header("a3")
            .at(ExpressionPosition::BeforeHeader)
            .expandable(true),
    );

    stem(
        groups(&[("A", &["a1", "a2", "a3"]), ("B", &["a2", "a3"]), ("C", &["a2", "a3", "a4"])]),
        rows_config,
        groups(&[("X", &["x1", "x2"]), ("Y", &["x2", "x3", "x4"])]),
        levels(&[false, false]),
        numbers(&[
            &[4.0, 3.0, 5.0, 2.0, 8.0],
            &[9.0, 2.0, 4.0, 7.0, 2.0],
            &[2.0, 2.0, 4.0, 3.0, 1.0],
            &[3.0, 4.0, 7.0, 1.0, 3.0],
            &[4.0, 2.0, 3.0, 4.0, 2.0],
            &[8.0, 2.0, 2.0, 5.0, 3.0],
            &[7.0, 3.0, 1.0, 6.0, 5.0],
            &[2.0, 5.0, 4.0, 7.0, 8.0],
        ]),
    )
}

// ============================================================================
// TRANSFORMS
// ============================================================================

/// Labels subtotals "H" and the grand total "S".
pub struct LevelTransform;

impl PivotTransform for LevelTransform {
    fn format_summary_header(&self, header: Option<&PivotDataHeader>, level: usize) -> SummaryHeader {
        SummaryHeader {
            title: header.map(|h| h.title.clone()),
            summary: if level > 0 { "H" } else { "S" }.to_string(),
        }
    }
}

// ============================================================================
// GRID CHECKS
// ============================================================================

/// Every position covered by another cell's span must be a `None` hole, and no
/// span may reach outside the grid.
pub fn assert_spans_are_holes(table: &PivotTable) {
    let rows = table.row_count();
    let columns = table.column_count();
    for row in &table.cells {
        assert_eq!(row.len(), columns, "ragged grid");
    }

    for r in 0..rows {
        for c in 0..columns {
            let Some(cell) = table.cell(r, c) else { continue };
            assert!(cell.row_span >= 1 && cell.col_span >= 1, "empty span at ({}, {})", r, c);
            assert!(r + cell.row_span <= rows, "row span out of grid at ({}, {})", r, c);
            assert!(c + cell.col_span <= columns, "column span out of grid at ({}, {})", r, c);
            for dr in 0..cell.row_span {
                for dc in 0..cell.col_span {
                    if dr == 0 && dc == 0 {
                        continue;
                    }
                    assert!(
                        table.cells[r + dr][c + dc].is_none(),
                        "({}, {}) is covered by the span of ({}, {})",
                        r + dr,
                        c + dc,
                        r,
                        c
                    );
                }
            }
        }
    }
}
