//! FILENAME: table-engine/src/lib.rs
//! Pivot table layout subsystem.
//!
//! This crate turns pivot models built by `pivot-engine` into renderable
//! grids and tracks which header groups the user has collapsed.
//!
//! Layers:
//! - `values`: Percentage totals and value preparation
//! - `view`: Renderable output for the frontend (WHAT we display)
//! - `engine`: Layout engine (HOW cells are placed)
//! - `state`: Expand/collapse tracking and visible cell filtering

pub mod engine;
pub mod state;
pub mod values;
pub mod view;

pub use engine::{create_tables, layout, prepare_stem, TableLayout};
pub use state::{
    filter_visible, resolve_activation, CellActivation, PivotTableState, PivotTablesState,
    VisibleCell, VisibleRow,
};
pub use values::{divide_values, prepare_values, value_type_infos, ValueTypeInfo};
pub use view::*;
