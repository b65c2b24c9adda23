//! FILENAME: pivot-engine/src/source.rs
//! The data-source seam.
//!
//! Grouping raw records by attribute values is not done here. A `PivotDataSource`
//! hands the builder a nested map per stem and answers metadata lookups.

use pivot_values::Constraint;
use serde::{Deserialize, Serialize};

use crate::data::{AggregatedMapData, DataResource};
use crate::definition::{PivotAttribute, PivotRowColumnAttribute, PivotValueAttribute};

/// Metadata of a source attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeInfo {
    pub id: String,
    pub name: String,
    pub constraint: Option<Constraint>,
}

impl AttributeInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        AttributeInfo {
            id: id.into(),
            name: name.into(),
            constraint: None,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

pub trait PivotDataSource {
    /// Groups the records of stem `stem_index` by the row then column attribute values.
    /// Leaves hold the records of every resource referenced by `values`.
    fn aggregate(
        &self,
        stem_index: usize,
        rows: &[PivotRowColumnAttribute],
        columns: &[PivotRowColumnAttribute],
        values: &[PivotValueAttribute],
    ) -> AggregatedMapData;

    fn attribute(&self, attribute: &PivotAttribute) -> Option<AttributeInfo>;

    /// Color of the resource owning `attribute`.
    fn resource_color(&self, stem_index: usize, attribute: &PivotAttribute) -> Option<String>;

    /// Distinct records of the resource owning `attribute`. Used by value-only stems.
    fn unique_resources(&self, stem_index: usize, attribute: &PivotAttribute) -> Vec<DataResource>;
}
