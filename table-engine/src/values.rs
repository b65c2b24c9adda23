//! FILENAME: table-engine/src/values.rs
//! Value type preparation.
//!
//! Percentage value types are rendered relative to a total: the grand total of
//! the value series, the total of the cell's row or the total of its column.
//! Totals are computed once per layout from the raw matrix; leaf values are
//! divided up front while grouped cells divide their re-aggregated raw value by
//! the sum of the totals they span.

use pivot_engine::{numeric_sum, ValueType};
use pivot_values::{Constraint, DataValue};

/// Totals and default formatting of one value series.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueTypeInfo {
    /// Grand total, for `ValueType::All`.
    pub sum: Option<f64>,
    /// Total per matrix row, for `ValueType::Row`.
    pub sums_rows: Vec<f64>,
    /// Total per matrix column, for `ValueType::Column`. Columns of other series stay 0.
    pub sums_columns: Vec<f64>,
    /// Two decimal number format when the series holds fractional values.
    pub default_constraint: Option<Constraint>,
}

/// Matrix columns of value series `index` out of `number_of_values`.
pub fn series_columns(columns: usize, number_of_values: usize, index: usize) -> Vec<usize> {
    (0..columns)
        .filter(|c| c % number_of_values.max(1) == index)
        .collect()
}

fn columns_count(values: &[Vec<DataValue>]) -> usize {
    values.first().map_or(0, Vec::len)
}

/// Computes the totals each value series needs for its value type.
pub fn value_type_infos(values: &[Vec<DataValue>], value_types: &[ValueType], number_of_values: usize) -> Vec<ValueTypeInfo> {
    let rows: Vec<usize> = (0..values.len()).collect();
    let columns_count = columns_count(values);

    (0..number_of_values.max(1))
        .map(|i| {
            let columns = series_columns(columns_count, number_of_values, i);
            let contains_decimal = rows
                .iter()
                .any(|&r| columns.iter().any(|&c| values[r].get(c).map_or(false, DataValue::is_decimal)));
            let mut info = ValueTypeInfo {
                default_constraint: contains_decimal.then(|| Constraint::number_with_decimals(2)),
                ..Default::default()
            };

            match value_types.get(i).copied().unwrap_or_default() {
                ValueType::All => info.sum = Some(numeric_sum(values, &rows, &columns)),
                ValueType::Row => {
                    info.sums_rows = rows.iter().map(|&r| numeric_sum(values, &[r], &columns)).collect();
                }
                ValueType::Column => {
                    info.sums_columns = vec![0.0; columns_count];
                    for &c in &columns {
                        info.sums_columns[c] = numeric_sum(values, &rows, &[c]);
                    }
                }
                ValueType::Default => {}
            }
            info
        })
        .collect()
}

/// Returns a copy of `values` with percentage series divided by their totals.
pub fn prepare_values(
    values: &[Vec<DataValue>],
    value_types: &[ValueType],
    number_of_values: usize,
    infos: &[ValueTypeInfo],
) -> Vec<Vec<DataValue>> {
    let mut prepared = values.to_vec();
    let columns_count = columns_count(values);

    for i in 0..number_of_values.max(1) {
        let value_type = value_types.get(i).copied().unwrap_or_default();
        let Some(info) = infos.get(i) else { continue };
        if !value_type.is_percentage() {
            continue;
        }

        for column in series_columns(columns_count, number_of_values, i) {
            for (row, row_values) in prepared.iter_mut().enumerate() {
                let Some(cell) = row_values.get_mut(column) else { continue };
                let divider = match value_type {
                    ValueType::All => info.sum,
                    ValueType::Row => info.sums_rows.get(row).copied(),
                    ValueType::Column => info.sums_columns.get(column).copied(),
                    ValueType::Default => None,
                };
                *cell = divide_values(cell, divider);
            }
        }
    }
    prepared
}

/// `value / divider`; a zero divider yields 0 and non-numeric operands yield `Empty`.
pub fn divide_values(value: &DataValue, divider: Option<f64>) -> DataValue {
    match (value.as_number(), divider) {
        (Some(_), Some(d)) if d == 0.0 => DataValue::Number(0.0),
        (Some(v), Some(d)) => DataValue::Number(v / d),
        _ => DataValue::Empty,
    }
}
