//! FILENAME: table-engine/src/view.rs
//! Pivot Table View - Renderable output for the frontend.
//!
//! The layout engine turns one pivot model into a dense grid of cells that a
//! frontend can render directly. Spanned regions are represented by `None`
//! holes: a cell with `row_span = 2` at `[r][c]` leaves `[r + 1][c]` empty.

use pivot_engine::DataResource;
use pivot_values::{contrast_color, Constraint};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ============================================================================
// CELL KIND
// ============================================================================

/// The role of a cell in the rendered grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellKind {
    /// Corner filler above the row headers.
    #[default]
    Empty,
    /// Leaf value at a row leaf x column leaf intersection.
    Data,
    /// Subtotal, grand total or expression value.
    GroupData,
    /// Row header label.
    RowHeader,
    /// Row subtotal, grand total or expression label.
    RowGroupHeader,
    /// Row attribute name in the corner.
    RowAttributeHeader,
    /// Column header label.
    ColumnHeader,
    /// Column subtotal, grand total or expression label.
    ColumnGroupHeader,
}

impl CellKind {
    /// Style class the frontend attaches to cells of this kind.
    pub fn css_class(self) -> &'static str {
        match self {
            CellKind::Empty => "pivot-empty-cell",
            CellKind::Data => "pivot-data-cell",
            CellKind::GroupData => "pivot-data-group-cell",
            CellKind::RowHeader => "pivot-row-header-cell",
            CellKind::RowGroupHeader => "pivot-row-group-header-cell",
            CellKind::RowAttributeHeader => "pivot-row-attribute-header-cell",
            CellKind::ColumnHeader => "pivot-column-header-cell",
            CellKind::ColumnGroupHeader => "pivot-column-group-header-cell",
        }
    }
}

// ============================================================================
// TABLE CELL
// ============================================================================

/// A single cell of the rendered grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotTableCell {
    /// Formatted value or header title. `None` for grand totals and expression labels.
    pub value: Option<String>,

    /// Summary label of subtotal and expression headers.
    pub summary: Option<String>,

    pub row_span: usize,
    pub col_span: usize,

    pub kind: CellKind,

    pub is_header: bool,
    pub is_summary: bool,
    pub is_attribute_header: bool,
    /// Set on every cell of the value region.
    pub is_value: bool,

    /// Background color as a hex string.
    pub background: Option<String>,

    /// Frozen while scrolling vertically.
    pub sticky_top: bool,
    /// Frozen while scrolling horizontally.
    pub sticky_start: bool,

    /// Data type of the header the cell belongs to.
    pub constraint: Option<Constraint>,

    /// Attribute name of the header.
    pub label: Option<String>,

    /// Records behind a value cell.
    pub data_resources: Vec<DataResource>,

    /// Grid rows an expandable summary row controls (including itself).
    pub row_indexes: Vec<usize>,

    /// Grid rows of the immediate children of a row header.
    pub child_indexes: SmallVec<[usize; 4]>,

    /// Whether the cell can be collapsed by the user.
    pub expandable: bool,
}

impl Default for PivotTableCell {
    fn default() -> Self {
        PivotTableCell {
            value: None,
            summary: None,
            row_span: 1,
            col_span: 1,
            kind: CellKind::Empty,
            is_header: false,
            is_summary: false,
            is_attribute_header: false,
            is_value: false,
            background: None,
            sticky_top: false,
            sticky_start: false,
            constraint: None,
            label: None,
            data_resources: Vec::new(),
            row_indexes: Vec::new(),
            child_indexes: SmallVec::new(),
            expandable: false,
        }
    }
}

impl PivotTableCell {
    /// Creates a leaf value cell.
    pub fn data(value: String, data_resources: Vec<DataResource>) -> Self {
        PivotTableCell {
            value: Some(value),
            kind: CellKind::Data,
            is_value: true,
            data_resources,
            ..Default::default()
        }
    }

    /// Creates a subtotal, grand total or expression value cell.
    pub fn group_data(value: String, data_resources: Vec<DataResource>) -> Self {
        PivotTableCell {
            value: Some(value),
            kind: CellKind::GroupData,
            is_value: true,
            data_resources,
            ..Default::default()
        }
    }

    /// Creates an unfilled value cell. `kind` is `Data` or `GroupData`.
    pub fn blank_value(kind: CellKind) -> Self {
        PivotTableCell {
            value: Some(String::new()),
            kind,
            is_value: true,
            ..Default::default()
        }
    }

    /// Creates a corner filler cell.
    pub fn empty() -> Self {
        PivotTableCell {
            value: Some(String::new()),
            ..Default::default()
        }
    }

    /// Creates a row header cell.
    pub fn row_header(title: String) -> Self {
        PivotTableCell {
            value: Some(title),
            kind: CellKind::RowHeader,
            is_header: true,
            ..Default::default()
        }
    }

    /// Creates a column header cell.
    pub fn column_header(title: String) -> Self {
        PivotTableCell {
            value: Some(title),
            kind: CellKind::ColumnHeader,
            is_header: true,
            ..Default::default()
        }
    }

    /// Creates a row subtotal or expression label.
    pub fn row_group_header(title: Option<String>, summary: Option<String>) -> Self {
        PivotTableCell {
            value: title,
            summary,
            kind: CellKind::RowGroupHeader,
            is_summary: true,
            ..Default::default()
        }
    }

    /// Creates a column subtotal, expression or value title label.
    pub fn column_group_header(title: Option<String>, summary: Option<String>) -> Self {
        PivotTableCell {
            value: title,
            summary,
            kind: CellKind::ColumnGroupHeader,
            is_summary: true,
            ..Default::default()
        }
    }

    /// Creates a row attribute name cell.
    pub fn attribute_header(title: String) -> Self {
        PivotTableCell {
            value: Some(title),
            kind: CellKind::RowAttributeHeader,
            is_attribute_header: true,
            ..Default::default()
        }
    }

    pub fn with_row_span(mut self, span: usize) -> Self {
        self.row_span = span;
        self
    }

    pub fn with_col_span(mut self, span: usize) -> Self {
        self.col_span = span;
        self
    }

    pub fn with_background(mut self, background: Option<String>) -> Self {
        self.background = background;
        self
    }

    pub fn with_sticky(mut self, sticky_top: bool, sticky_start: bool) -> Self {
        self.sticky_top = sticky_top;
        self.sticky_start = sticky_start;
        self
    }

    /// Sets the constraint and attribute name of the header the cell describes.
    pub fn with_header_info(mut self, constraint: Option<Constraint>, label: Option<String>) -> Self {
        self.constraint = constraint;
        self.label = label;
        self
    }

    /// Sets child rows; the cell becomes expandable when it has more than one.
    pub fn with_child_indexes(mut self, child_indexes: SmallVec<[usize; 4]>) -> Self {
        self.expandable = child_indexes.len() > 1;
        self.child_indexes = child_indexes;
        self
    }

    pub fn with_row_indexes(mut self, row_indexes: Vec<usize>, expandable: bool) -> Self {
        self.row_indexes = row_indexes;
        self.expandable = expandable;
        self
    }

    /// Text color readable on the cell background.
    pub fn text_color(&self) -> &'static str {
        contrast_color(self.background.as_deref())
    }

    /// Copy of a value cell with its content removed.
    pub fn blanked(&self) -> Self {
        PivotTableCell {
            value: Some(String::new()),
            data_resources: Vec::new(),
            ..self.clone()
        }
    }
}

// ============================================================================
// TABLE
// ============================================================================

/// The rendered grid of one pivot model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotTable {
    /// Indexed as cells[row][col]. `None` marks a position covered by a span.
    pub cells: Vec<Vec<Option<PivotTableCell>>>,

    /// Number of row header columns (left frozen area).
    pub row_levels: usize,

    /// Number of column header rows (top frozen area).
    pub column_levels: usize,
}

impl PivotTable {
    pub fn row_count(&self) -> usize {
        self.cells.len()
    }

    pub fn column_count(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Gets a cell at the specified position.
    pub fn cell(&self, row: usize, col: usize) -> Option<&PivotTableCell> {
        self.cells.get(row).and_then(|r| r.get(col)).and_then(Option::as_ref)
    }

    /// Value of the cell at the specified position, if the cell exists and has one.
    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.cell(row, col).and_then(|c| c.value.as_deref())
    }

    /// Formatted values of the value region of `row`.
    pub fn row_values(&self, row: usize) -> Vec<&str> {
        self.cells
            .get(row)
            .map(|cells| {
                cells
                    .iter()
                    .skip(self.row_levels)
                    .map(|c| c.as_ref().and_then(|c| c.value.as_deref()).unwrap_or(""))
                    .collect()
            })
            .unwrap_or_default()
    }
}
