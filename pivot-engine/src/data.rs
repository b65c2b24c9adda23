//! FILENAME: pivot-engine/src/data.rs
//! Pivot Data - The built model.
//!
//! Two representations of the same logical cube live side by side:
//! - the row and column header trees (`PivotDataHeader`), and
//! - the dense `values` / `data_resources` matrices owned by `PivotStemData`.
//!
//! They are joined only through integer `target_index` values on leaf headers.
//! The nested `AggregatedMap` is the input handed over by the aggregation adapter.

use pivot_values::{Constraint, DataValue};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::definition::{
    AggregationType, ExpressionOperation, ExpressionPosition, PivotDimensionConfig, ResourceType,
    ValueType,
};
use crate::error::{PivotError, Result};

// ============================================================================
// RECORDS
// ============================================================================

/// A raw record contributing to a cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataResource {
    pub id: String,
    /// Owning entity id (collection or link type).
    pub resource_id: String,
    pub resource_type: ResourceType,
    /// Field values keyed by attribute id.
    pub data: FxHashMap<String, DataValue>,
}

impl DataResource {
    pub fn new(id: impl Into<String>, resource_id: impl Into<String>) -> Self {
        DataResource {
            id: id.into(),
            resource_id: resource_id.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, attribute_id: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.data.insert(attribute_id.into(), value.into());
        self
    }

    pub fn value(&self, attribute_id: &str) -> &DataValue {
        static EMPTY: DataValue = DataValue::Empty;
        self.data.get(attribute_id).unwrap_or(&EMPTY)
    }
}

/// Records of one resource collected under a leaf of the nested map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregatedDataValues {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub objects: Vec<DataResource>,
}

// ============================================================================
// NESTED AGGREGATED MAP
// ============================================================================

/// Node of the nested map: either another level of keys or the leaf record lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregatedNode {
    Values(Vec<AggregatedDataValues>),
    Map(AggregatedMap),
}

impl AggregatedNode {
    pub fn as_map(&self) -> Option<&AggregatedMap> {
        match self {
            AggregatedNode::Map(map) => Some(map),
            AggregatedNode::Values(_) => None,
        }
    }

    pub fn as_values(&self) -> Option<&[AggregatedDataValues]> {
        match self {
            AggregatedNode::Values(values) => Some(values),
            AggregatedNode::Map(_) => None,
        }
    }

    /// Deep merge: record lists are concatenated, maps merged key by key.
    /// Nodes of different kinds are left untouched.
    pub fn merge(&mut self, other: AggregatedNode) {
        match (self, other) {
            (AggregatedNode::Values(mine), AggregatedNode::Values(theirs)) => mine.extend(theirs),
            (AggregatedNode::Map(mine), AggregatedNode::Map(theirs)) => mine.merge(theirs),
            _ => {}
        }
    }
}

/// Insertion-ordered map from group key to node.
/// Key order is the order in which headers are emitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<(String, AggregatedNode)>", into = "Vec<(String, AggregatedNode)>")]
pub struct AggregatedMap {
    entries: Vec<(String, AggregatedNode)>,
    index: FxHashMap<String, usize>,
}

impl AggregatedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AggregatedNode> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_map(&self, key: &str) -> Option<&AggregatedMap> {
        self.get(key).and_then(AggregatedNode::as_map)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregatedNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Inserts or merges `node` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, node: AggregatedNode) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1.merge(node),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, node));
            }
        }
    }

    /// Returns the sub-map under `key`, creating it when missing.
    pub fn entry_map(&mut self, key: &str) -> &mut AggregatedMap {
        let i = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), AggregatedNode::Map(AggregatedMap::new())));
                self.entries.len() - 1
            }
        };
        if !matches!(self.entries[i].1, AggregatedNode::Map(_)) {
            self.entries[i].1 = AggregatedNode::Map(AggregatedMap::new());
        }
        match &mut self.entries[i].1 {
            AggregatedNode::Map(map) => map,
            AggregatedNode::Values(_) => unreachable!("entry replaced by a map above"),
        }
    }

    pub fn merge(&mut self, other: AggregatedMap) {
        for (key, node) in other.entries {
            self.insert(key, node);
        }
    }
}

impl PartialEq for AggregatedMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl From<Vec<(String, AggregatedNode)>> for AggregatedMap {
    fn from(entries: Vec<(String, AggregatedNode)>) -> Self {
        let mut map = AggregatedMap::new();
        for (key, node) in entries {
            map.insert(key, node);
        }
        map
    }
}

impl From<AggregatedMap> for Vec<(String, AggregatedNode)> {
    fn from(map: AggregatedMap) -> Self {
        map.entries
    }
}

/// Output of the aggregation adapter for one stem.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregatedMapData {
    /// row key -> ... -> column key -> ... -> records
    pub map: AggregatedMap,
    /// column key -> ... -> records, aggregated over all rows
    pub columns_map: AggregatedMap,
    pub row_levels: usize,
    pub column_levels: usize,
}

impl AggregatedMapData {
    pub fn merge(&mut self, other: AggregatedMapData) {
        self.map.merge(other.map);
        self.columns_map.merge(other.columns_map);
        self.row_levels = self.row_levels.max(other.row_levels);
        self.column_levels = self.column_levels.max(other.column_levels);
    }
}

// ============================================================================
// HEADER TREES
// ============================================================================

/// Attribute label shown in the table corner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotHeaderAttribute {
    pub title: String,
    pub color: Option<String>,
}

/// A node of a row or column header tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotDataHeader {
    pub title: String,
    pub children: Option<Vec<PivotDataHeader>>,
    /// Matrix row (row tree) or column (column tree). Set only on leaves.
    pub target_index: Option<usize>,
    pub color: Option<String>,
    /// Synthetic header naming a value column.
    pub is_value_header: bool,
    pub constraint: Option<Constraint>,
    pub attribute_name: Option<String>,
    /// Derived rows/columns rendered next to this header.
    pub expressions: Vec<HeaderExpression>,
}

impl PivotDataHeader {
    pub fn leaf(title: impl Into<String>, target_index: usize) -> Self {
        PivotDataHeader {
            title: title.into(),
            target_index: Some(target_index),
            ..Default::default()
        }
    }

    pub fn group(title: impl Into<String>, children: Vec<PivotDataHeader>) -> Self {
        PivotDataHeader {
            title: title.into(),
            children: Some(children),
            ..Default::default()
        }
    }

    pub fn value_header(title: impl Into<String>, target_index: usize, color: Option<String>) -> Self {
        PivotDataHeader {
            title: title.into(),
            target_index: Some(target_index),
            color,
            is_value_header: true,
            ..Default::default()
        }
    }

    pub fn children(&self) -> &[PivotDataHeader] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Leaf target indexes below this header, left to right.
    pub fn target_indexes(&self) -> Vec<usize> {
        let mut out = Vec::new();
        collect_target_indexes(self, &mut out);
        out
    }

    /// Number of expressions rendered before this header.
    pub fn expressions_before(&self) -> usize {
        self.expressions
            .iter()
            .filter(|e| e.position == ExpressionPosition::BeforeHeader)
            .count()
    }

    /// Number of expressions rendered after this header's subtree.
    pub fn expressions_after(&self) -> usize {
        self.expressions.len() - self.expressions_before()
    }
}

fn collect_target_indexes(header: &PivotDataHeader, out: &mut Vec<usize>) {
    match &header.children {
        Some(children) => {
            for child in children {
                collect_target_indexes(child, out);
            }
        }
        None => out.extend(header.target_index),
    }
}

/// Unique leaf target indexes below `headers`, in visiting order.
pub fn target_indexes_for_headers(headers: &[PivotDataHeader]) -> Vec<usize> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    for header in headers {
        for index in header.target_indexes() {
            if seen.insert(index) {
                out.push(index);
            }
        }
    }
    out
}

/// Highest target index in a tree, if any leaf exists.
pub fn max_target_index(headers: &[PivotDataHeader]) -> Option<usize> {
    headers
        .iter()
        .flat_map(|h| h.target_indexes())
        .max()
}

/// Expression resolved against a concrete header level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderExpression {
    pub title: String,
    pub operation: ExpressionOperation,
    pub operands: Vec<HeaderOperand>,
    pub position: ExpressionPosition,
    pub expandable: bool,
}

/// Operand of a resolved expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HeaderOperand {
    /// Sibling headers matched by `pattern`.
    Header {
        pattern: String,
        headers: SmallVec<[PivotDataHeader; 2]>,
    },
    Value { value: f64 },
    Expression(HeaderExpression),
}

// ============================================================================
// STEM DATA
// ============================================================================

/// The pivot model of one stem or merged stem group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotStemData {
    pub row_headers: Vec<PivotDataHeader>,
    pub row_header_attributes: Vec<Option<PivotHeaderAttribute>>,
    pub column_headers: Vec<PivotDataHeader>,
    pub column_header_attributes: Vec<Option<PivotHeaderAttribute>>,
    pub value_titles: Vec<String>,
    /// `values[row][column]`, indexed by target indexes.
    pub values: Vec<Vec<DataValue>>,
    /// Records contributing to each matrix cell.
    pub data_resources: Vec<Vec<Vec<DataResource>>>,
    pub values_constraints: Vec<Option<Constraint>>,
    pub value_types: Vec<ValueType>,
    pub value_aggregations: Vec<AggregationType>,
    pub rows_config: Vec<PivotDimensionConfig>,
    pub columns_config: Vec<PivotDimensionConfig>,
    /// The innermost column level names value columns.
    pub has_additional_column_level: bool,
}

impl PivotStemData {
    /// True when neither axis has headers; such stems render as empty tables.
    pub fn is_empty(&self) -> bool {
        self.row_headers.is_empty() && self.column_headers.is_empty()
    }

    pub fn number_of_values(&self) -> usize {
        self.value_titles.len()
    }

    pub fn row_show_sums(&self) -> Vec<bool> {
        self.rows_config.iter().map(|c| c.show_sums).collect()
    }

    pub fn column_show_sums(&self) -> Vec<bool> {
        self.columns_config.iter().map(|c| c.show_sums).collect()
    }

    pub fn value(&self, row: usize, column: usize) -> &DataValue {
        static EMPTY: DataValue = DataValue::Empty;
        self.values
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY)
    }

    pub fn resources(&self, row: usize, column: usize) -> &[DataResource] {
        self.data_resources
            .get(row)
            .and_then(|r| r.get(column))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Checks that the values matrix covers every target index of both trees.
    pub fn validate(&self) -> Result<()> {
        let expected_rows = max_target_index(&self.row_headers).map_or(0, |m| m + 1);
        let expected_columns = max_target_index(&self.column_headers).map_or(0, |m| m + 1);
        let rows = self.values.len();
        let columns = self.values.iter().map(Vec::len).min().unwrap_or(0);
        let has_values = !self.value_titles.is_empty();
        let rows_ok = !has_values || rows >= expected_rows.max(1);
        let columns_ok = !has_values || columns >= expected_columns.max(1);
        if rows_ok && columns_ok {
            Ok(())
        } else {
            Err(PivotError::MatrixShape {
                expected_rows,
                expected_columns,
                rows,
                columns,
            })
        }
    }
}

/// Result of building a whole configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotData {
    pub data: Vec<PivotStemData>,
    pub merge_tables: bool,
    /// At most one table would be produced with merging enabled.
    pub able_to_merge: bool,
}
