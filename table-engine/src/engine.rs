//! FILENAME: table-engine/src/engine.rs
//! Table Layout Engine - Turns a pivot model into a renderable grid.
//!
//! This module takes a PivotStemData (header trees + values matrix) and produces
//! a PivotTable (2D grid of cells ready for rendering).
//!
//! Algorithm:
//! 1. Compute value type totals and pre-divide percentage series
//! 2. Sort the header trees and attach expressions
//! 3. Map every original row/column index to its grid position
//! 4. Pre-fill the value region and the corner
//! 5. Row pass: headers, expression rows, subtotal rows
//! 6. Column pass: headers, expression columns, subtotal columns
//! 7. Fill subtotal/expression intersections and paint group colors
//!
//! A header block is laid out as: expressions positioned before the header,
//! the header and its subtree, expressions positioned after it. Subtotals close
//! the siblings of a level.

use log::debug;
use pivot_engine::{
    aggregate_values, evaluate_expression, inject_expressions, sort_pivot_data,
    target_indexes_for_headers, AggregationType, DataResource, Evaluation, ExpressionPosition,
    HeaderExpression, OperandResolver, PivotData, PivotDataHeader, PivotDimensionConfig,
    PivotStemData, PivotTransform, ValueType,
};
use pivot_values::{shade_color, summary_background, Constraint, DataValue};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::values::{divide_values, prepare_values, value_type_infos, ValueTypeInfo};
use crate::view::{CellKind, PivotTable, PivotTableCell};

// ============================================================================
// HEADER COUNTS
// ============================================================================

/// Grid slots taken by `header` and its subtree: leaves, nested subtotals and
/// every expression attached inside it.
fn header_slot_count(header: &PivotDataHeader, level: usize, show_sums: &[bool], number_of_sums: usize) -> usize {
    let own = match &header.children {
        Some(children) if !children.is_empty() => {
            let nested: usize = children
                .iter()
                .map(|c| header_slot_count(c, level + 1, show_sums, number_of_sums))
                .sum();
            nested + sums_at(show_sums, level + 1, number_of_sums)
        }
        // an empty group takes no slots, not even a subtotal
        Some(_) => 0,
        None => 1,
    };
    own + header.expressions.len()
}

/// Span of the header cell itself: its children's slots, without the closing subtotal.
fn header_span(header: &PivotDataHeader, level: usize, show_sums: &[bool], number_of_sums: usize) -> usize {
    match &header.children {
        Some(children) => children
            .iter()
            .map(|c| header_slot_count(c, level + 1, show_sums, number_of_sums))
            .sum(),
        None => 1,
    }
}

fn headers_slot_count(headers: &[PivotDataHeader], show_sums: &[bool], number_of_sums: usize) -> usize {
    let nested: usize = headers
        .iter()
        .map(|h| header_slot_count(h, 0, show_sums, number_of_sums))
        .sum();
    nested + sums_at(show_sums, 0, number_of_sums)
}

fn sums_at(show_sums: &[bool], level: usize, number_of_sums: usize) -> usize {
    if show_sums.get(level).copied().unwrap_or(false) {
        number_of_sums
    } else {
        0
    }
}

// ============================================================================
// TRANSFORMATION MAPS
// ============================================================================

/// Grid position of every original row (or column) index. `None` for indexes no leaf owns.
#[derive(Debug, Clone, Default)]
struct TransformationMap {
    positions: Vec<Option<usize>>,
    inverse: FxHashMap<usize, usize>,
}

impl TransformationMap {
    fn from_headers(headers: &[PivotDataHeader], show_sums: &[bool], start: usize, number_of_sums: usize) -> Self {
        let mut map = TransformationMap::default();
        map.walk(headers, 0, start, show_sums, number_of_sums);
        map
    }

    /// Map of a single synthetic index placed at `position`.
    fn single(position: usize) -> Self {
        let mut map = TransformationMap::default();
        map.set(0, position);
        map
    }

    fn walk(&mut self, headers: &[PivotDataHeader], level: usize, start: usize, show_sums: &[bool], number_of_sums: usize) -> usize {
        let mut current = start;
        for header in headers {
            current += header.expressions_before();
            match &header.children {
                Some(children) if !children.is_empty() => {
                    current = self.walk(children, level + 1, current, show_sums, number_of_sums)
                }
                Some(_) => {}
                None => {
                    if let Some(target) = header.target_index {
                        self.set(target, current);
                    }
                    current += 1;
                }
            }
            current += header.expressions_after();
        }
        current + sums_at(show_sums, level, number_of_sums)
    }

    fn set(&mut self, index: usize, position: usize) {
        if self.positions.len() <= index {
            self.positions.resize(index + 1, None);
        }
        self.positions[index] = Some(position);
        self.inverse.insert(position, index);
    }

    fn get(&self, index: usize) -> Option<usize> {
        self.positions.get(index).copied().flatten()
    }

    /// Original indexes paired with their grid positions.
    fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (i, p)))
    }

    fn transform(&self, indexes: &[usize]) -> Vec<usize> {
        indexes.iter().filter_map(|&i| self.get(i)).collect()
    }

    fn original(&self, positions: &[usize]) -> Vec<usize> {
        positions.iter().filter_map(|p| self.inverse.get(p).copied()).collect()
    }

    fn contains_position(&self, position: usize) -> bool {
        self.inverse.contains_key(&position)
    }
}

// ============================================================================
// GROUP INFO
// ============================================================================

/// A subtotal or expression row/column, remembered for the intersection pass.
#[derive(Debug, Clone)]
struct HeaderGroup {
    background: String,
    /// Grid positions of the leaves the group aggregates.
    indexes: Vec<usize>,
    expression: Option<HeaderExpression>,
    level: usize,
}

/// Index of the first level that is not sticky, or the level count when all are.
fn non_sticky_index(configs: &[PivotDimensionConfig], levels: usize) -> usize {
    if !configs.is_empty() && configs.iter().all(|c| c.sticky) {
        levels
    } else {
        configs.iter().position(|c| !c.sticky).unwrap_or(0)
    }
}

fn header_background(header: &PivotDataHeader, level: usize) -> Option<String> {
    let opacity = (50 + level * 5).min(80) as f64 / 100.0;
    header.color.as_deref().and_then(|color| shade_color(color, opacity))
}

// ============================================================================
// TABLE LAYOUT
// ============================================================================

/// Lays out one prepared pivot model.
pub struct TableLayout<'a> {
    /// Sorted model with expressions attached and percentage values pre-divided.
    data: &'a PivotStemData,
    /// Matrix before percentage division; grouped cells re-aggregate these.
    raw_values: &'a [Vec<DataValue>],
    transform: &'a dyn PivotTransform,
    value_infos: Vec<ValueTypeInfo>,

    number_of_sums: usize,
    row_levels: usize,
    column_levels: usize,
    non_sticky_row: usize,
    non_sticky_column: usize,
    row_show_sums: Vec<bool>,
    column_show_sums: Vec<bool>,

    rows: TransformationMap,
    columns: TransformationMap,

    cells: Vec<Vec<Option<PivotTableCell>>>,
    row_groups: Vec<Option<HeaderGroup>>,
    column_groups: Vec<Option<HeaderGroup>>,
}

impl<'a> TableLayout<'a> {
    pub fn new(
        data: &'a PivotStemData,
        raw_values: &'a [Vec<DataValue>],
        value_infos: Vec<ValueTypeInfo>,
        transform: &'a dyn PivotTransform,
    ) -> Self {
        let number_of_sums = data.number_of_values().max(1);
        let has_values = data.number_of_values() > 0;
        let row_levels = data.rows_config.len();
        let column_levels = data.columns_config.len() + usize::from(data.has_additional_column_level);
        let row_show_sums = data.row_show_sums();
        let column_show_sums = data.column_show_sums();

        let rows = if !data.row_headers.is_empty() {
            TransformationMap::from_headers(&data.row_headers, &row_show_sums, column_levels, 1)
        } else if has_values {
            TransformationMap::single(column_levels)
        } else {
            TransformationMap::default()
        };
        let columns = if !data.column_headers.is_empty() {
            TransformationMap::from_headers(&data.column_headers, &column_show_sums, row_levels, number_of_sums)
        } else if has_values {
            TransformationMap::single(row_levels)
        } else {
            TransformationMap::default()
        };

        TableLayout {
            data,
            raw_values,
            transform,
            value_infos,
            number_of_sums,
            row_levels,
            column_levels,
            non_sticky_row: non_sticky_index(&data.rows_config, row_levels),
            non_sticky_column: non_sticky_index(&data.columns_config, column_levels),
            row_show_sums,
            column_show_sums,
            rows,
            columns,
            cells: Vec::new(),
            row_groups: Vec::new(),
            column_groups: Vec::new(),
        }
    }

    /// Executes the full layout and returns the grid.
    pub fn calculate(mut self) -> PivotTable {
        let data = self.data;

        // Step 1: Allocate the grid, value region and corner
        self.init_cells();

        // Step 2: Leaf values
        self.fill_leaf_cells();

        // Step 3: Row headers, expression rows, subtotal rows
        self.fill_rows(&data.row_headers, 0, self.column_levels, None);

        // Step 4: Column headers, expression columns, subtotal columns
        self.fill_columns(&data.column_headers, 0, self.row_levels, None);

        // Step 5: Group intersections and colors
        self.fill_intersections();

        debug!(
            "laid out pivot table: {}x{} grid, {} row levels, {} column levels",
            self.cells.len(),
            self.cells.first().map_or(0, Vec::len),
            self.row_levels,
            self.column_levels
        );

        PivotTable {
            cells: self.cells,
            row_levels: self.row_levels,
            column_levels: self.column_levels,
        }
    }

    // ========================================================================
    // GRID INITIALIZATION
    // ========================================================================

    fn rows_count(&self) -> usize {
        if self.data.row_headers.is_empty() && self.data.number_of_values() > 0 {
            return 1;
        }
        headers_slot_count(&self.data.row_headers, &self.row_show_sums, 1)
    }

    fn columns_count(&self) -> usize {
        if self.data.column_headers.is_empty() && self.data.number_of_values() > 0 {
            return 1;
        }
        headers_slot_count(&self.data.column_headers, &self.column_show_sums, self.number_of_sums)
    }

    fn init_cells(&mut self) {
        let rows = self.rows_count() + self.column_levels;
        let columns = self.columns_count() + self.row_levels;

        self.cells = (0..rows)
            .map(|i| {
                (0..columns)
                    .map(|j| {
                        if i < self.column_levels || j < self.row_levels {
                            return None;
                        }
                        let kind = if self.rows.contains_position(i) && self.columns.contains_position(j) {
                            CellKind::Data
                        } else {
                            CellKind::GroupData
                        };
                        Some(PivotTableCell::blank_value(kind))
                    })
                    .collect()
            })
            .collect();
        self.row_groups = vec![None; rows];
        self.column_groups = vec![None; columns];

        if self.row_levels > 0 && self.column_levels > 0 {
            self.init_corner();
        }
    }

    fn init_corner(&mut self) {
        let data = self.data;
        for j in 0..self.row_levels {
            let sticky_start = self.is_row_level_sticky(j);
            match data.row_header_attributes.get(j).and_then(Option::as_ref) {
                Some(attribute) => {
                    let title_span = if self.non_sticky_column > 0 {
                        self.non_sticky_column
                    } else {
                        self.column_levels
                    };
                    self.cells[0][j] = Some(
                        PivotTableCell::attribute_header(attribute.title.clone())
                            .with_row_span(title_span)
                            .with_sticky(self.is_column_level_sticky(0), sticky_start)
                            .with_background(attribute.color.clone()),
                    );
                    if self.column_levels > title_span {
                        self.cells[self.non_sticky_column][j] = Some(
                            PivotTableCell::attribute_header(String::new())
                                .with_row_span(self.column_levels - title_span)
                                .with_sticky(false, sticky_start)
                                .with_background(attribute.color.clone()),
                        );
                    }
                }
                None => {
                    for i in 0..self.column_levels {
                        self.cells[i][j] = Some(
                            PivotTableCell::empty().with_sticky(self.is_column_level_sticky(i), sticky_start),
                        );
                    }
                }
            }
        }
    }

    fn fill_leaf_cells(&mut self) {
        let data = self.data;
        let rows: Vec<(usize, usize)> = self.rows.iter().collect();
        let columns: Vec<(usize, usize)> = self.columns.iter().collect();
        for &(row, grid_row) in &rows {
            for &(column, grid_column) in &columns {
                let formatted = self.format_single_value(data.value(row, column), column);
                let resources = data.resources(row, column).to_vec();
                self.cells[grid_row][grid_column] = Some(PivotTableCell::data(formatted, resources));
            }
        }
    }

    // ========================================================================
    // ROW PASS
    // ========================================================================

    /// Lays out `headers` at `level` starting at grid row `start`. Returns the next free row.
    fn fill_rows(&mut self, headers: &'a [PivotDataHeader], level: usize, start: usize, parent: Option<&'a PivotDataHeader>) -> usize {
        let mut current = start;
        for header in headers {
            for expression in header.expressions.iter().filter(|e| e.position == ExpressionPosition::BeforeHeader) {
                self.fill_expression_row(expression, level, current);
                current += 1;
            }

            let span = header_span(header, level, &self.row_show_sums, 1);
            if span > 0 {
                let cell = PivotTableCell::row_header(self.transform.format_row_header(&header.title, level))
                    .with_row_span(span)
                    .with_sticky(false, self.is_row_level_sticky(level))
                    .with_background(header_background(header, level))
                    .with_header_info(header.constraint.clone(), header.attribute_name.clone())
                    .with_child_indexes(self.child_rows(header, level, current));
                self.cells[current][level] = Some(cell);
            }

            match &header.children {
                Some(children) if !children.is_empty() => {
                    current = self.fill_rows(children, level + 1, current, Some(header))
                }
                Some(_) => {}
                None => current += 1,
            }

            for expression in header.expressions.iter().filter(|e| e.position != ExpressionPosition::BeforeHeader) {
                self.fill_expression_row(expression, level, current);
                current += 1;
            }
        }

        if self.row_show_sums.get(level).copied().unwrap_or(false) {
            self.fill_subtotal_row(headers, level, current, parent);
            current += 1;
        }
        current
    }

    /// Grid rows of the header cells of `header`'s immediate children.
    fn child_rows(&self, header: &PivotDataHeader, level: usize, start: usize) -> SmallVec<[usize; 4]> {
        let Some(children) = &header.children else {
            return SmallVec::from_slice(&[start]);
        };
        let mut current = start;
        let mut rows = SmallVec::new();
        for child in children {
            rows.push(current + child.expressions_before());
            current += header_slot_count(child, level + 1, &self.row_show_sums, 1);
        }
        rows
    }

    fn fill_expression_row(&mut self, expression: &HeaderExpression, level: usize, row: usize) {
        let background = summary_background(level).to_string();
        let columns: Vec<(usize, usize)> = self.columns.iter().collect();
        for (column, grid_column) in columns {
            let evaluation = evaluate_expression(expression, &RowOperands { layout: self, columns: &[column] });
            let formatted = self.format_by_constraint(&DataValue::Number(evaluation.value), self.value_index(&[column]));
            self.cells[row][grid_column] = Some(
                PivotTableCell::group_data(formatted, evaluation.data_resources).with_background(Some(background.clone())),
            );
        }

        let mut row_indexes = evaluate_expression(expression, &RowOperands { layout: self, columns: &[] }).indexes;
        row_indexes.push(row);
        row_indexes.sort_unstable();
        row_indexes.dedup();

        self.split_row_group_header(
            level,
            row,
            RowGroupLabel {
                title: None,
                summary: expression.title.clone(),
                constraint: None,
                label: None,
            },
            &background,
            row_indexes,
            expression.expandable,
        );
        self.row_groups[row] = Some(HeaderGroup {
            background,
            indexes: Vec::new(),
            expression: Some(expression.clone()),
            level,
        });
    }

    fn fill_subtotal_row(&mut self, headers: &[PivotDataHeader], level: usize, row: usize, parent: Option<&PivotDataHeader>) {
        let summary = self.transform.format_summary_header(parent, level);
        let background = summary_background(level).to_string();
        self.split_row_group_header(
            level.saturating_sub(1),
            row,
            RowGroupLabel {
                title: summary.title,
                summary: summary.summary,
                constraint: parent.and_then(|p| p.constraint.clone()),
                label: parent.and_then(|p| p.attribute_name.clone()),
            },
            &background,
            Vec::new(),
            false,
        );

        let rows = target_indexes_for_headers(headers);
        let columns: Vec<(usize, usize)> = self.columns.iter().collect();
        for (column, grid_column) in columns {
            let (values, resources) = self.grouped_values(&rows, &[column]);
            let formatted = self.aggregate_and_format(&values, &rows, &[column]);
            self.cells[row][grid_column] =
                Some(PivotTableCell::group_data(formatted, resources).with_background(Some(background.clone())));
        }

        self.row_groups[row] = Some(HeaderGroup {
            background,
            indexes: self.rows.transform(&rows),
            expression: None,
            level,
        });
    }

    /// Places a row group label spanning the remaining row header columns, split in
    /// two at the non-sticky boundary so the sticky part scrolls correctly.
    fn split_row_group_header(
        &mut self,
        column: usize,
        row: usize,
        label: RowGroupLabel,
        background: &str,
        row_indexes: Vec<usize>,
        expandable: bool,
    ) {
        let mut col_span = self.row_levels.saturating_sub(column).max(1);
        let sticky_start = self.is_row_level_sticky(column);

        if sticky_start && self.non_sticky_row > column && self.non_sticky_row < self.row_levels && col_span > 1 {
            let sticky_span = self.non_sticky_row - column;
            self.cells[row][self.non_sticky_row] = Some(
                PivotTableCell::row_group_header(None, None)
                    .with_col_span(col_span - sticky_span)
                    .with_background(Some(background.to_string())),
            );
            col_span = sticky_span;
        }

        self.cells[row][column] = Some(
            PivotTableCell::row_group_header(label.title, Some(label.summary))
                .with_col_span(col_span)
                .with_sticky(false, sticky_start)
                .with_background(Some(background.to_string()))
                .with_header_info(label.constraint, label.label)
                .with_row_indexes(row_indexes, expandable),
        );
    }

    // ========================================================================
    // COLUMN PASS
    // ========================================================================

    fn fill_columns(&mut self, headers: &'a [PivotDataHeader], level: usize, start: usize, parent: Option<&'a PivotDataHeader>) -> usize {
        let mut current = start;
        for header in headers {
            for expression in header.expressions.iter().filter(|e| e.position == ExpressionPosition::BeforeHeader) {
                self.fill_expression_column(expression, level, current);
                current += 1;
            }

            let span = header_span(header, level, &self.column_show_sums, self.number_of_sums);
            if span > 0 {
                let cell = PivotTableCell::column_header(self.transform.format_column_header(&header.title, level))
                    .with_col_span(span)
                    .with_sticky(self.is_column_level_sticky(level), false)
                    .with_background(header_background(header, level))
                    .with_header_info(header.constraint.clone(), header.attribute_name.clone());
                self.cells[level][current] = Some(cell);
            }

            match &header.children {
                Some(children) if !children.is_empty() => {
                    current = self.fill_columns(children, level + 1, current, Some(header))
                }
                Some(_) => {}
                None => current += 1,
            }

            for expression in header.expressions.iter().filter(|e| e.position != ExpressionPosition::BeforeHeader) {
                self.fill_expression_column(expression, level, current);
                current += 1;
            }
        }

        if self.column_show_sums.get(level).copied().unwrap_or(false) {
            self.fill_subtotal_columns(headers, level, current, parent);
            current += self.number_of_sums;
        }
        current
    }

    fn fill_subtotal_columns(&mut self, headers: &[PivotDataHeader], level: usize, column: usize, parent: Option<&PivotDataHeader>) {
        let background = summary_background(level).to_string();
        let summary = self.transform.format_summary_header(parent, level);
        let number_of_values = self.data.number_of_values();
        let row_index = level.saturating_sub(1);
        let add_value_headers = number_of_values > 1 && self.column_levels > 0;
        let sticky_top = self.is_column_level_sticky(level);

        let row_span = self
            .column_levels
            .saturating_sub(row_index + usize::from(add_value_headers))
            .max(1);
        self.cells[row_index][column] = Some(
            PivotTableCell::column_group_header(summary.title, Some(summary.summary))
                .with_header_info(parent.and_then(|p| p.constraint.clone()), parent.and_then(|p| p.attribute_name.clone()))
                .with_sticky(sticky_top, false)
                .with_row_span(row_span)
                .with_col_span(self.number_of_sums)
                .with_background(Some(background.clone())),
        );

        if number_of_values == 0 {
            self.column_groups[column] = Some(HeaderGroup {
                background,
                indexes: Vec::new(),
                expression: None,
                level,
            });
            return;
        }

        let all_columns = target_indexes_for_headers(headers);
        for i in 0..number_of_values {
            let grid_column = column + i;
            if add_value_headers {
                self.cells[self.column_levels - 1][grid_column] = Some(
                    PivotTableCell::column_group_header(Some(self.data.value_titles[i].clone()), None)
                        .with_sticky(sticky_top, false)
                        .with_background(Some(background.clone())),
                );
            }

            let value_columns: Vec<usize> = all_columns
                .iter()
                .copied()
                .filter(|c| c % number_of_values == i)
                .collect();
            let rows: Vec<(usize, usize)> = self.rows.iter().collect();
            for (row, grid_row) in rows {
                let (values, resources) = self.grouped_values(&[row], &value_columns);
                let formatted = self.aggregate_and_format(&values, &[row], &value_columns);
                self.cells[grid_row][grid_column] =
                    Some(PivotTableCell::group_data(formatted, resources).with_background(Some(background.clone())));
            }

            self.column_groups[grid_column] = Some(HeaderGroup {
                background: background.clone(),
                indexes: self.columns.transform(&value_columns),
                expression: None,
                level,
            });
        }
    }

    /// Expression columns take one grid column and evaluate over the first value series.
    fn fill_expression_column(&mut self, expression: &HeaderExpression, level: usize, column: usize) {
        let background = summary_background(level).to_string();
        self.cells[level][column] = Some(
            PivotTableCell::column_group_header(None, Some(expression.title.clone()))
                .with_row_span(self.column_levels.saturating_sub(level).max(1))
                .with_sticky(self.is_column_level_sticky(level), false)
                .with_background(Some(background.clone())),
        );

        let rows: Vec<(usize, usize)> = self.rows.iter().collect();
        for (row, grid_row) in rows {
            let evaluation = evaluate_expression(expression, &ColumnOperands { layout: self, rows: &[row] });
            let formatted = self.format_by_constraint(&DataValue::Number(evaluation.value), 0);
            self.cells[grid_row][column] = Some(
                PivotTableCell::group_data(formatted, evaluation.data_resources).with_background(Some(background.clone())),
            );
        }

        let indexes = evaluate_expression(expression, &ColumnOperands { layout: self, rows: &[] }).indexes;
        self.column_groups[column] = Some(HeaderGroup {
            background,
            indexes,
            expression: Some(expression.clone()),
            level,
        });
    }

    // ========================================================================
    // INTERSECTIONS
    // ========================================================================

    fn fill_intersections(&mut self) {
        let rows_count = self.cells.len();
        let columns_count = self.cells.first().map_or(0, Vec::len);
        let row_groups = std::mem::take(&mut self.row_groups);
        let column_groups = std::mem::take(&mut self.column_groups);

        for (i, row_group) in row_groups.iter().enumerate() {
            let Some(row_group) = row_group else { continue };

            for (j, column_group) in column_groups.iter().enumerate() {
                let Some(column_group) = column_group else { continue };
                let rows = self.rows.original(&row_group.indexes);
                let columns = self.columns.original(&column_group.indexes);

                let (formatted, resources) = if let Some(expression) = &row_group.expression {
                    let evaluation = evaluate_expression(expression, &RowOperands { layout: self, columns: &columns });
                    let value = DataValue::Number(evaluation.value);
                    (self.format_by_constraint(&value, self.value_index(&columns)), evaluation.data_resources)
                } else if let Some(expression) = &column_group.expression {
                    let evaluation = evaluate_expression(expression, &ColumnOperands { layout: self, rows: &rows });
                    (self.format_by_constraint(&DataValue::Number(evaluation.value), 0), evaluation.data_resources)
                } else {
                    let (values, resources) = self.grouped_values(&rows, &columns);
                    (self.aggregate_and_format(&values, &rows, &columns), resources)
                };
                self.cells[i][j] = Some(PivotTableCell::group_data(formatted, resources));
            }

            // row group colors paint the whole data row
            for cell in self.cells[i].iter_mut().skip(self.row_levels).take(columns_count).flatten() {
                cell.background = Some(row_group.background.clone());
            }
        }

        for (j, column_group) in column_groups.iter().enumerate() {
            let Some(column_group) = column_group else { continue };
            for i in self.column_levels..rows_count {
                let deeper_or_absent = row_groups[i].as_ref().map_or(true, |g| g.level > column_group.level);
                if deeper_or_absent {
                    if let Some(cell) = self.cells[i][j].as_mut() {
                        cell.background = Some(column_group.background.clone());
                    }
                }
            }
        }
    }

    // ========================================================================
    // VALUES AND FORMATTING
    // ========================================================================

    fn is_row_level_sticky(&self, level: usize) -> bool {
        self.data.rows_config.get(level).map_or(false, |c| c.sticky)
    }

    fn is_column_level_sticky(&self, level: usize) -> bool {
        let configs = &self.data.columns_config;
        if configs.is_empty() {
            return false;
        }
        configs[level.min(configs.len() - 1)].sticky
    }

    fn value_index(&self, columns: &[usize]) -> usize {
        columns.first().map_or(0, |c| c % self.number_of_sums)
    }

    fn aggregation(&self, value_index: usize) -> AggregationType {
        self.data
            .value_aggregations
            .get(value_index)
            .copied()
            .unwrap_or_default()
            .for_groups()
    }

    fn value_constraint(&self, value_index: usize) -> Option<&Constraint> {
        self.data
            .values_constraints
            .get(value_index)
            .and_then(Option::as_ref)
            .or_else(|| self.value_infos.get(value_index).and_then(|i| i.default_constraint.as_ref()))
    }

    fn format_by_constraint(&self, value: &DataValue, value_index: usize) -> String {
        match self.value_constraint(value_index) {
            Some(constraint) => constraint.format(value),
            None => value.display_value(),
        }
    }

    fn format_join(&self, value: &DataValue, value_index: usize) -> String {
        self.value_constraint(value_index)
            .cloned()
            .unwrap_or_default()
            .format(value)
    }

    fn value_type(&self, value_index: usize) -> ValueType {
        self.data.value_types.get(value_index).copied().unwrap_or_default()
    }

    /// Leaf values are already divided for percentage series.
    fn format_single_value(&self, value: &DataValue, column: usize) -> String {
        let value_index = self.value_index(&[column]);
        if self.aggregation(value_index) == AggregationType::Join {
            return self.format_join(value, value_index);
        }
        if self.value_type(value_index).is_percentage() {
            return Constraint::percentage(2).format(value);
        }
        self.format_by_constraint(value, value_index)
    }

    /// Raw values and records at every `rows` x `columns` intersection.
    fn grouped_values(&self, rows: &[usize], columns: &[usize]) -> (Vec<DataValue>, Vec<DataResource>) {
        let mut values = Vec::with_capacity(rows.len() * columns.len());
        let mut resources = Vec::new();
        for &row in rows {
            for &column in columns {
                let value = self
                    .raw_values
                    .get(row)
                    .and_then(|r| r.get(column))
                    .cloned()
                    .unwrap_or_default();
                values.push(value);
                resources.extend_from_slice(self.data.resources(row, column));
            }
        }
        (values, resources)
    }

    fn aggregate_and_format(&self, values: &[DataValue], rows: &[usize], columns: &[usize]) -> String {
        let value_index = self.value_index(columns);
        let aggregation = self.aggregation(value_index);
        let value = aggregate_values(aggregation, values);
        if aggregation == AggregationType::Join {
            return self.format_join(&value, value_index);
        }

        let Some(info) = self.value_infos.get(value_index) else {
            return self.format_by_constraint(&value, value_index);
        };
        let divider = match self.value_type(value_index) {
            ValueType::Default => return self.format_by_constraint(&value, value_index),
            ValueType::All => info.sum,
            ValueType::Column => Some(
                columns
                    .iter()
                    .filter_map(|&c| info.sums_columns.get(c))
                    .sum::<f64>(),
            ),
            ValueType::Row => Some(rows.iter().filter_map(|&r| info.sums_rows.get(r)).sum::<f64>()),
        };
        Constraint::percentage(2).format(&divide_values(&value, divider))
    }
}

/// Labels of a row subtotal or expression header.
struct RowGroupLabel {
    title: Option<String>,
    summary: String,
    constraint: Option<Constraint>,
    label: Option<String>,
}

// ============================================================================
// EXPRESSION OPERANDS
// ============================================================================

/// Resolves row header operands over a fixed set of matrix columns.
struct RowOperands<'l, 'a> {
    layout: &'l TableLayout<'a>,
    columns: &'l [usize],
}

impl OperandResolver for RowOperands<'_, '_> {
    fn resolve_headers(&self, headers: &[PivotDataHeader]) -> Evaluation {
        let rows = target_indexes_for_headers(headers);
        let (values, data_resources) = self.layout.grouped_values(&rows, self.columns);
        let aggregation = self.layout.aggregation(self.layout.value_index(self.columns));
        Evaluation {
            value: aggregate_values(aggregation, &values).as_number().unwrap_or(0.0),
            data_resources,
            indexes: self.layout.rows.transform(&rows),
        }
    }
}

/// Resolves column header operands over a fixed set of matrix rows, first value series only.
struct ColumnOperands<'l, 'a> {
    layout: &'l TableLayout<'a>,
    rows: &'l [usize],
}

impl OperandResolver for ColumnOperands<'_, '_> {
    fn resolve_headers(&self, headers: &[PivotDataHeader]) -> Evaluation {
        let number_of_sums = self.layout.number_of_sums;
        let columns: Vec<usize> = target_indexes_for_headers(headers)
            .into_iter()
            .filter(|c| c % number_of_sums == 0)
            .collect();
        let (values, data_resources) = self.layout.grouped_values(self.rows, &columns);
        Evaluation {
            value: aggregate_values(self.layout.aggregation(0), &values)
                .as_number()
                .unwrap_or(0.0),
            data_resources,
            indexes: self.layout.columns.transform(&columns),
        }
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Computes value totals, pre-divides percentage series, sorts and attaches expressions.
/// Returns the prepared model and the value type infos computed from the raw matrix.
pub fn prepare_stem(stem: &PivotStemData) -> (PivotStemData, Vec<ValueTypeInfo>) {
    let number_of_sums = stem.number_of_values().max(1);
    let infos = value_type_infos(&stem.values, &stem.value_types, number_of_sums);
    let values = prepare_values(&stem.values, &stem.value_types, number_of_sums, &infos);
    let prepared = PivotStemData {
        values,
        ..stem.clone()
    };
    (inject_expressions(sort_pivot_data(prepared)), infos)
}

/// Lays out one pivot model. Models without row and column headers produce an empty table.
pub fn layout(stem: &PivotStemData, transform: &dyn PivotTransform) -> PivotTable {
    if stem.is_empty() {
        return PivotTable::default();
    }
    let (prepared, infos) = prepare_stem(stem);
    TableLayout::new(&prepared, &stem.values, infos, transform).calculate()
}

/// Lays out every model of `data`, one table per stem or merged stem group.
pub fn create_tables(data: &PivotData, transform: &dyn PivotTransform) -> Vec<PivotTable> {
    debug!("creating {} pivot tables", data.data.len());
    data.data.iter().map(|stem| layout(stem, transform)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivot_engine::{DefaultTransform, ExpressionOperation, PivotExpression, PivotHeaderAttribute};

    fn leaf(title: &str, index: usize) -> PivotDataHeader {
        PivotDataHeader::leaf(title, index)
    }

    fn group(title: &str, children: Vec<PivotDataHeader>) -> PivotDataHeader {
        PivotDataHeader::group(title, children)
    }

    fn configs(show_sums: &[bool]) -> Vec<PivotDimensionConfig> {
        show_sums.iter().map(|s| PivotDimensionConfig::with_sums(*s)).collect()
    }

    #[test]
    fn test_slot_counts() {
        let header = group("A", vec![leaf("a1", 0), leaf("a2", 1)]);
        assert_eq!(header_slot_count(&header, 0, &[true, true], 1), 3);
        assert_eq!(header_span(&header, 0, &[true, true], 1), 2);
        assert_eq!(headers_slot_count(&[header.clone()], &[true, true], 1), 4);
        // column subtotals reserve one column per value
        assert_eq!(headers_slot_count(&[header], &[true, false], 3), 5);
    }

    #[test]
    fn test_transformation_map_with_subtotals() {
        let headers = vec![
            group("A", vec![leaf("a1", 0), leaf("a2", 1)]),
            group("B", vec![leaf("b1", 2)]),
        ];
        let map = TransformationMap::from_headers(&headers, &[true, true], 1, 1);
        // A: 1, 2, subtotal 3; B: 4, subtotal 5; grand total 6
        assert_eq!(map.transform(&[0, 1, 2]), vec![1, 2, 4]);
        assert_eq!(map.original(&[4, 5]), vec![2]);
    }

    #[test]
    fn test_transformation_map_skips_expression_slots() {
        let mut a = leaf("a", 0);
        a.expressions.push(HeaderExpression {
            title: "e".to_string(),
            operation: ExpressionOperation::Add,
            operands: Vec::new(),
            position: ExpressionPosition::BeforeHeader,
            expandable: false,
        });
        let mut b = leaf("b", 1);
        b.expressions.push(HeaderExpression {
            position: ExpressionPosition::AfterHeader,
            ..a.expressions[0].clone()
        });
        let map = TransformationMap::from_headers(&[a, b, leaf("c", 2)], &[], 0, 1);
        assert_eq!(map.transform(&[0, 1, 2]), vec![1, 2, 4]);
    }

    #[test]
    fn test_non_sticky_index() {
        let mut sticky = configs(&[false, false]);
        assert_eq!(non_sticky_index(&sticky, 2), 0);
        sticky[0].sticky = true;
        assert_eq!(non_sticky_index(&sticky, 2), 1);
        sticky[1].sticky = true;
        assert_eq!(non_sticky_index(&sticky, 3), 3);
        assert_eq!(non_sticky_index(&[], 1), 0);
    }

    #[test]
    fn test_sticky_subtotal_is_split() {
        let mut rows_config = configs(&[true, false, false]);
        rows_config[0].sticky = true;
        let stem = PivotStemData {
            row_headers: vec![group("A", vec![group("a", vec![leaf("x", 0)])])],
            rows_config,
            ..Default::default()
        };
        let table = layout(&stem, &DefaultTransform);
        // x at row 0, grand total at row 1 split at the non-sticky column 1
        let total = table.cell(1, 0).unwrap();
        assert_eq!(total.col_span, 1);
        assert!(total.sticky_start);
        let rest = table.cell(1, 1).unwrap();
        assert_eq!(rest.col_span, 2);
        assert_eq!(rest.value, None);
        assert!(rest.is_summary);
    }

    #[test]
    fn test_attribute_header_in_corner() {
        let mut columns_config = configs(&[false]);
        columns_config[0].sticky = true;
        let stem = PivotStemData {
            row_headers: vec![leaf("r", 0)],
            row_header_attributes: vec![Some(PivotHeaderAttribute {
                title: "Region".to_string(),
                color: Some("#3366cc".to_string()),
            })],
            column_headers: vec![leaf("c", 0)],
            value_titles: vec!["sum".to_string()],
            values: vec![vec![DataValue::Number(1.0)]],
            rows_config: configs(&[false]),
            columns_config,
            ..Default::default()
        };
        let table = layout(&stem, &DefaultTransform);
        let corner = table.cell(0, 0).unwrap();
        assert!(corner.is_attribute_header);
        assert_eq!(corner.kind, CellKind::RowAttributeHeader);
        assert_eq!(corner.value.as_deref(), Some("Region"));
        assert_eq!(corner.row_span, 1);
        assert!(corner.sticky_top);
    }

    #[test]
    fn test_column_expression_reserves_a_column() {
        let mut columns_config = configs(&[false]);
        columns_config[0].expressions.push(
            PivotExpression::new("x - y", ExpressionOperation::Subtract).header("^x$").header("^y$"),
        );
        let stem = PivotStemData {
            row_headers: vec![leaf("r", 0)],
            column_headers: vec![leaf("x", 0), leaf("y", 1)],
            value_titles: vec!["sum".to_string()],
            values: vec![vec![DataValue::Number(5.0), DataValue::Number(3.0)]],
            rows_config: configs(&[false]),
            columns_config,
            ..Default::default()
        };
        let table = layout(&stem, &DefaultTransform);
        assert_eq!(table.column_count(), 4);
        assert_eq!(table.row_values(1), vec!["5", "3", "2"]);
        let header = table.cell(0, 3).unwrap();
        assert_eq!(header.summary.as_deref(), Some("x - y"));
        assert_eq!(header.kind, CellKind::ColumnGroupHeader);
    }
}
