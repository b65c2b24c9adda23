//! FILENAME: pivot-values/src/lib.rs
//! PURPOSE: Shared value types for the pivot engine and the table layout engine.
//! CONTEXT: Re-exports the data value enum, constraints, formatting and color helpers.

pub mod color;
pub mod constraint;
pub mod number_format;
pub mod value;

// Re-export commonly used types at the crate root
pub use color::{
    contrast_color, shade_color, summary_background, Color, COLOR_GRAY100, COLOR_GRAY200,
    COLOR_GRAY300, COLOR_GRAY400, COLOR_GRAY500, COLOR_LIGHT, COLOR_PRIMARY, GROUP_COLORS,
};
pub use constraint::Constraint;
pub use number_format::{format_decimal, format_general, format_percentage};
pub use value::{compare_text, compare_values, DataValue};
