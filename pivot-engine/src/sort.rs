//! FILENAME: pivot-engine/src/sort.rs
//! Sorting of header trees, by title or by a cross section of the values matrix.
//!
//! Sorting only reorders siblings. Target indexes are untouched, so the values
//! matrix stays valid.

use pivot_values::{Constraint, DataValue};
use rustc_hash::FxHashMap;

use crate::data::{target_indexes_for_headers, PivotDataHeader, PivotStemData};
use crate::definition::PivotSort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Rows,
    Columns,
}

/// Sorts both header trees of `data` level by level.
pub fn sort_pivot_data(mut data: PivotStemData) -> PivotStemData {
    let row_sorts: Vec<Option<PivotSort>> = data.rows_config.iter().map(|c| c.sort.clone()).collect();
    let column_sorts: Vec<Option<PivotSort>> = data.columns_config.iter().map(|c| c.sort.clone()).collect();

    let rows = HeaderSorter {
        sorts: &row_sorts,
        other_side: &data.column_headers,
        values: &data.values,
        value_titles: &data.value_titles,
        axis: Axis::Rows,
    }
    .sort(&data.row_headers, 0);

    let columns = HeaderSorter {
        sorts: &column_sorts,
        other_side: &data.row_headers,
        values: &data.values,
        value_titles: &data.value_titles,
        axis: Axis::Columns,
    }
    .sort(&data.column_headers, 0);

    data.row_headers = rows;
    data.column_headers = columns;
    data
}

struct HeaderSorter<'s> {
    sorts: &'s [Option<PivotSort>],
    other_side: &'s [PivotDataHeader],
    values: &'s [Vec<DataValue>],
    value_titles: &'s [String],
    axis: Axis,
}

impl<'s> HeaderSorter<'s> {
    fn sort(&self, headers: &[PivotDataHeader], level: usize) -> Vec<PivotDataHeader> {
        // value-title headers keep their order
        if self.axis == Axis::Columns && is_values_headers(headers, self.value_titles) {
            return headers.to_vec();
        }

        let sort = self.sorts.get(level).and_then(Option::as_ref);
        let constraint = sort_constraint(sort, headers);
        let keys = self.sort_keys(headers, sort);

        let mut sorted: Vec<(DataValue, PivotDataHeader)> = headers
            .iter()
            .map(|header| {
                let mut header = header.clone();
                if let Some(children) = &header.children {
                    header.children = Some(self.sort(children, level + 1));
                }
                let key = keys.get(header.title.as_str()).cloned().unwrap_or_default();
                (key, header)
            })
            .collect();

        let ascending = sort.map_or(true, |s| s.asc);
        sorted.sort_by(|(a, _), (b, _)| {
            let ordering = constraint.compare(a, b);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        sorted.into_iter().map(|(_, header)| header).collect()
    }

    /// Sort key per header title: the title itself, or the sum of the selected values.
    fn sort_keys<'h>(&self, headers: &'h [PivotDataHeader], sort: Option<&PivotSort>) -> FxHashMap<&'h str, DataValue> {
        let targets = sort.and_then(|s| self.sort_target_indexes(s));
        headers
            .iter()
            .map(|header| {
                let key = match &targets {
                    None => DataValue::text(header.title.clone()),
                    Some(targets) => {
                        let own = header.target_indexes();
                        let sum = match self.axis {
                            Axis::Rows => numeric_sum(self.values, &own, targets),
                            Axis::Columns => numeric_sum(self.values, targets, &own),
                        };
                        DataValue::Number(sum)
                    }
                };
                (header.title.as_str(), key)
            })
            .collect()
    }

    /// Target indexes of the other axis selected by the sort's value path.
    fn sort_target_indexes(&self, sort: &PivotSort) -> Option<Vec<usize>> {
        let list = sort.list.as_ref()?;
        let value_count = self.value_titles.len();
        let value_index = match self.value_titles.iter().position(|t| *t == list.value_title) {
            Some(i) => i,
            None if value_count == 1 => 0,
            None => return None,
        };

        let mut found: Option<&PivotDataHeader> = None;
        let mut current: &[PivotDataHeader] = self.other_side;
        for step in &list.values {
            if step.is_summary {
                let indexes = target_indexes_for_headers(current);
                return Some(filter_by_value(indexes, value_count, value_index));
            }
            match current.iter().find(|h| h.title == step.title) {
                Some(header) => {
                    found = Some(header);
                    current = header.children();
                }
                None => break,
            }
        }

        let header = found?;
        let indexes = match header.target_index {
            Some(index) => vec![index],
            None => target_indexes_for_headers(current),
        };
        Some(filter_by_value(indexes, value_count, value_index))
    }
}

fn sort_constraint(sort: Option<&PivotSort>, headers: &[PivotDataHeader]) -> Constraint {
    let by_values = sort
        .and_then(|s| s.list.as_ref())
        .map_or(false, |l| !l.values.is_empty());
    if by_values {
        return Constraint::number();
    }
    headers
        .first()
        .and_then(|h| h.constraint.clone())
        .unwrap_or_default()
}

/// A level made only of the synthetic value-title leaves.
fn is_values_headers(headers: &[PivotDataHeader], value_titles: &[String]) -> bool {
    value_titles.len() > 1
        && headers.iter().enumerate().all(|(i, h)| {
            h.target_index.is_some() && value_titles.get(i).map_or(false, |t| *t == h.title)
        })
}

fn filter_by_value(indexes: Vec<usize>, value_count: usize, value_index: usize) -> Vec<usize> {
    if value_count == 0 {
        return indexes;
    }
    indexes
        .into_iter()
        .filter(|i| i % value_count == value_index)
        .collect()
}

/// Sum of the numeric cells at `rows` x `columns`.
pub fn numeric_sum(values: &[Vec<DataValue>], rows: &[usize], columns: &[usize]) -> f64 {
    let mut sum = 0.0;
    for &row in rows {
        let Some(row_values) = values.get(row) else { continue };
        for &column in columns {
            if let Some(n) = row_values.get(column).and_then(DataValue::as_number) {
                sum += n;
            }
        }
    }
    sum
}
