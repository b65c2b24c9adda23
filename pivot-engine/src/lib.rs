//! FILENAME: pivot-engine/src/lib.rs
//! Pivot model subsystem.
//!
//! This crate turns grouped records into a hierarchical pivot model: a row
//! header tree, a column header tree and a dense values matrix joined through
//! leaf target indexes. It depends on `pivot-values` only for shared value,
//! constraint and color types.
//!
//! Layers:
//! - `definition`: Serializable configuration (what the pivot IS)
//! - `data`: Nested aggregated maps in, pivot model out
//! - `source` / `transform`: Seams for the grouping engine and label formatting
//! - `aggregation`: Aggregate functions over records and cell values
//! - `engine`: Model builder (HOW we build)
//! - `sort` / `expressions`: Model augmentation before layout

pub mod aggregation;
pub mod data;
pub mod definition;
pub mod engine;
pub mod error;
pub mod expressions;
pub mod sort;
pub mod source;
pub mod transform;

pub use aggregation::{aggregate_resources, aggregate_values, unique_values, AggregateAccumulator};
pub use data::*;
pub use definition::*;
pub use engine::{build_stem_data, create_data, PivotBuilder};
pub use error::{PivotError, Result};
pub use expressions::{
    compile_pattern, evaluate_expression, extend_expression, inject_expressions, Evaluation,
    OperandResolver,
};
pub use sort::{numeric_sum, sort_pivot_data};
pub use source::{AttributeInfo, PivotDataSource};
pub use transform::{DefaultTransform, PivotTransform, SummaryHeader};
