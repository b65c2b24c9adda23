//! FILENAME: table-engine/src/state.rs
//! Expand/Collapse State - Which header groups the user has folded.
//!
//! The state is a set of collapsed `(row, column)` grid positions per table. A
//! position absent from the set is expanded. Rendering goes through
//! `filter_visible`, which walks the grid region by region:
//! - header rows above the value region are always kept
//! - a collapsed header replaces its block with one row whose values are blank
//! - a collapsed expandable summary hides the rows it refers to
//!
//! Every visible cell remembers its original grid position so interactions on
//! the filtered view can be mapped back to the full table.

use std::ops::Range;

use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::view::{PivotTable, PivotTableCell};

// ============================================================================
// TABLE STATE
// ============================================================================

/// Collapsed positions of one table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PivotTableState {
    collapsed: FxHashSet<(usize, usize)>,
    rows: usize,
    columns: usize,
}

impl PivotTableState {
    /// Fully expanded state for `table`.
    pub fn new(table: &PivotTable) -> Self {
        PivotTableState {
            collapsed: FxHashSet::default(),
            rows: table.row_count(),
            columns: table.column_count(),
        }
    }

    /// State with every expandable row header collapsed, nested ones included.
    pub fn collapse_all(table: &PivotTable) -> Self {
        let mut state = PivotTableState::new(table);
        for row in table.column_levels..table.row_count() {
            for column in 0..table.row_levels {
                let Some(cell) = table.cell(row, column) else { continue };
                if cell.is_value || cell.is_attribute_header {
                    break;
                }
                if cell.expandable {
                    state.collapsed.insert((row, column));
                }
            }
        }
        debug!("collapsed {} header groups", state.collapsed.len());
        state
    }

    /// Clears every collapsed position.
    pub fn expand_all(&mut self) {
        self.collapsed.clear();
    }

    pub fn is_collapsed(&self, row: usize, column: usize) -> bool {
        self.collapsed.contains(&(row, column))
    }

    pub fn collapsed_count(&self) -> usize {
        self.collapsed.len()
    }

    /// Flips the position. Returns false, leaving the state untouched, when the
    /// position is outside the table.
    pub fn toggle(&mut self, row: usize, column: usize) -> bool {
        if row >= self.rows || column >= self.columns {
            warn!(
                "ignoring toggle at ({}, {}) outside a {}x{} table",
                row, column, self.rows, self.columns
            );
            return false;
        }
        if !self.collapsed.remove(&(row, column)) {
            self.collapsed.insert((row, column));
        }
        true
    }

    /// Owned variant of `toggle`.
    pub fn toggled(mut self, row: usize, column: usize) -> Self {
        self.toggle(row, column);
        self
    }

    /// Whether the state was recorded against a grid of the same shape.
    pub fn fits(&self, table: &PivotTable) -> bool {
        self.rows == table.row_count() && self.columns == table.column_count()
    }
}

/// Collapse states of all tables of one pivot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PivotTablesState {
    tables: Vec<PivotTableState>,
}

impl PivotTablesState {
    pub fn new(tables: &[PivotTable]) -> Self {
        PivotTablesState {
            tables: tables.iter().map(PivotTableState::new).collect(),
        }
    }

    /// Resets to fully expanded when the number of tables or any table's row
    /// count changed. Returns true on reset.
    pub fn sync(&mut self, tables: &[PivotTable]) -> bool {
        let unchanged = self.tables.len() == tables.len()
            && self
                .tables
                .iter()
                .zip(tables)
                .all(|(state, table)| state.rows == table.row_count());
        if unchanged {
            return false;
        }
        debug!("pivot tables changed shape, resetting collapse state");
        *self = PivotTablesState::new(tables);
        true
    }

    pub fn get(&self, table_index: usize) -> Option<&PivotTableState> {
        self.tables.get(table_index)
    }

    pub fn get_mut(&mut self, table_index: usize) -> Option<&mut PivotTableState> {
        self.tables.get_mut(table_index)
    }

    pub fn toggle(&mut self, table_index: usize, row: usize, column: usize) -> bool {
        match self.tables.get_mut(table_index) {
            Some(state) => state.toggle(row, column),
            None => {
                warn!("ignoring toggle on missing table {}", table_index);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

// ============================================================================
// VISIBLE CELLS
// ============================================================================

/// A cell of the filtered view, tagged with its position in the full grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleCell {
    pub original_row: usize,
    pub original_column: usize,
    pub cell: PivotTableCell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRow {
    pub original_row: usize,
    /// Same width as the full grid; `None` where a span or a collapse covers the position.
    pub cells: Vec<Option<VisibleCell>>,
}

/// A click on the filtered view mapped back to the full grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellActivation {
    pub table_index: usize,
    pub original_row: usize,
    pub original_column: usize,
    pub cell: PivotTableCell,
}

/// Resolves the cell at `row`/`column` of a filtered view.
pub fn resolve_activation(visible: &[VisibleRow], table_index: usize, row: usize, column: usize) -> Option<CellActivation> {
    let visible_cell = visible.get(row)?.cells.get(column)?.as_ref()?;
    Some(CellActivation {
        table_index,
        original_row: visible_cell.original_row,
        original_column: visible_cell.original_column,
        cell: visible_cell.cell.clone(),
    })
}

/// Rows of `table` that remain visible under `state`.
pub fn filter_visible(table: &PivotTable, state: &PivotTableState) -> Vec<VisibleRow> {
    if table.is_empty() {
        return Vec::new();
    }
    if !state.fits(table) {
        warn!("collapse state does not match the table shape, rendering expanded");
        return filter_visible(table, &PivotTableState::new(table));
    }

    let filter = VisibilityFilter { table, state };
    let header_rows = table.column_levels.min(table.row_count());
    let mut rows: Vec<VisibleRow> = (0..header_rows).map(|r| filter.flat_row(r, 0)).collect();
    rows.extend(filter.region(header_rows..table.row_count(), 0));
    rows
}

struct VisibilityFilter<'a> {
    table: &'a PivotTable,
    state: &'a PivotTableState,
}

impl VisibilityFilter<'_> {
    fn width(&self) -> usize {
        self.table.column_count()
    }

    fn visible_cell(&self, row: usize, column: usize) -> Option<VisibleCell> {
        self.table.cell(row, column).map(|cell| VisibleCell {
            original_row: row,
            original_column: column,
            cell: cell.clone(),
        })
    }

    /// Row `row` as laid out, with everything left of `from` cleared.
    fn flat_row(&self, row: usize, from: usize) -> VisibleRow {
        VisibleRow {
            original_row: row,
            cells: (0..self.width())
                .map(|c| if c < from { None } else { self.visible_cell(row, c) })
                .collect(),
        }
    }

    /// Single row standing in for the collapsed block of the header at `row`/`column`.
    fn collapsed_row(&self, row: usize, column: usize, header: &PivotTableCell) -> VisibleRow {
        let value_start = self.table.row_levels;
        let cells = (0..self.width())
            .map(|c| {
                if c == column {
                    let mut cell = header.clone();
                    cell.row_span = 1;
                    cell.col_span = value_start.saturating_sub(column).max(1);
                    Some(VisibleCell {
                        original_row: row,
                        original_column: column,
                        cell,
                    })
                } else if c < value_start {
                    None
                } else {
                    self.table.cell(row, c).map(|cell| VisibleCell {
                        original_row: row,
                        original_column: c,
                        cell: cell.blanked(),
                    })
                }
            })
            .collect();
        VisibleRow { original_row: row, cells }
    }

    /// Rows referred to by expandable summaries of this region, mapped to their referrers.
    fn referrers(&self, rows: &Range<usize>, column: usize) -> FxHashMap<usize, Vec<usize>> {
        let mut referrers: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for row in rows.clone() {
            let Some(cell) = self.table.cell(row, column) else { continue };
            if !(cell.is_summary && cell.expandable) {
                continue;
            }
            for &index in cell.row_indexes.iter().filter(|&&i| i != row) {
                referrers.entry(index).or_default().push(row);
            }
        }
        referrers
    }

    fn has_nested_group(&self, row: usize, column: usize) -> bool {
        (column..self.table.row_levels)
            .filter_map(|c| self.table.cell(row, c))
            .any(|cell| cell.child_indexes.len() > 1)
    }

    fn region(&self, rows: Range<usize>, column: usize) -> Vec<VisibleRow> {
        let referrers = self.referrers(&rows, column);
        let mut result = Vec::new();
        let mut row = rows.start;

        while row < rows.end {
            let Some(cell) = self.table.cell(row, column) else {
                row += 1;
                continue;
            };

            if cell.is_attribute_header || cell.is_summary || cell.is_value {
                result.push(self.flat_row(row, column));
                row += 1;
                continue;
            }

            let span = cell.row_span.max(1).min(rows.end - row);
            let visible = referrers
                .get(&row)
                .map_or(true, |refs| refs.iter().any(|&r| !self.state.is_collapsed(r, column)));

            if visible {
                if !self.has_nested_group(row, column) {
                    result.extend((row..row + span).map(|r| self.flat_row(r, column)));
                } else if self.state.is_collapsed(row, column) {
                    result.push(self.collapsed_row(row, column, cell));
                } else {
                    let mut nested = self.region(row..row + span, column + 1);
                    if nested.is_empty() {
                        result.push(self.collapsed_row(row, column, cell));
                    } else {
                        let mut header = cell.clone();
                        header.row_span = nested.len();
                        nested[0].cells[column] = Some(VisibleCell {
                            original_row: row,
                            original_column: column,
                            cell: header,
                        });
                        result.append(&mut nested);
                    }
                }
            }
            row += span;
        }
        result
    }
}
