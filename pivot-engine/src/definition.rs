//! FILENAME: pivot-engine/src/definition.rs
//! Pivot Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE a pivot:
//! which attributes group rows and columns, which attributes are aggregated,
//! per-level subtotal/sticky/sort settings and user-defined expressions.
//! These structures are designed to be:
//! - Serializable (loaded from and saved to JSON)
//! - Immutable snapshots of user intent

use pivot_values::Constraint;
use serde::{Deserialize, Serialize};

use crate::error::{PivotError, Result};

/// The only configuration version understood by this crate.
pub const PIVOT_CONFIG_VERSION: &str = "1";

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for value attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    #[default]
    Sum,
    Count,
    Unique,
    #[serde(alias = "average")]
    Avg,
    Min,
    Max,
    Median,
    Product,
    StdDev,
    Var,
    Join,
}

impl AggregationType {
    /// Aggregations whose result can be re-aggregated with the same function.
    /// Counting aggregations are re-aggregated by summing the partial counts.
    pub fn is_value_aggregation(self) -> bool {
        !matches!(self, AggregationType::Count | AggregationType::Unique)
    }

    /// Aggregation used when grouped cells combine already aggregated values.
    pub fn for_groups(self) -> AggregationType {
        if self.is_value_aggregation() {
            self
        } else {
            AggregationType::Sum
        }
    }

    /// Constraint implied by the aggregation itself, if any.
    pub fn constraint(self) -> Option<Constraint> {
        match self {
            AggregationType::Count | AggregationType::Unique => Some(Constraint::number()),
            _ => None,
        }
    }

    /// Label used in value titles when no translation is supplied.
    pub fn label(self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Count => "count",
            AggregationType::Unique => "unique",
            AggregationType::Avg => "avg",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Median => "median",
            AggregationType::Product => "product",
            AggregationType::StdDev => "stddev",
            AggregationType::Var => "var",
            AggregationType::Join => "join",
        }
    }
}

/// Normalization applied to a value column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Default,
    /// Percentage of the column's total across all rows.
    Column,
    /// Percentage of the row's total across all columns.
    Row,
    /// Percentage of the grand total.
    All,
}

impl ValueType {
    pub fn is_percentage(self) -> bool {
        self != ValueType::Default
    }
}

// ============================================================================
// ATTRIBUTES
// ============================================================================

/// Kind of resource an attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    #[default]
    Collection,
    LinkType,
}

/// Reference to a source field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotAttribute {
    /// Owning entity id.
    pub resource_id: String,
    pub resource_type: ResourceType,
    /// Position of the resource inside its query stem.
    pub resource_index: usize,
    pub attribute_id: String,
    /// Overrides the attribute's own constraint when valid.
    pub constraint: Option<Constraint>,
}

impl PivotAttribute {
    pub fn new(resource_id: impl Into<String>, attribute_id: impl Into<String>) -> Self {
        PivotAttribute {
            resource_id: resource_id.into(),
            attribute_id: attribute_id.into(),
            ..Default::default()
        }
    }
}

/// Attribute grouping rows or columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRowColumnAttribute {
    #[serde(flatten)]
    pub attribute: PivotAttribute,
    /// Add a subtotal after the groups of this level.
    #[serde(default)]
    pub show_sums: bool,
    /// Keep this level frozen while scrolling.
    #[serde(default)]
    pub sticky: bool,
    /// Render the attribute name in the table corner.
    #[serde(default)]
    pub show_header: bool,
    #[serde(default)]
    pub sort: Option<PivotSort>,
    #[serde(default)]
    pub expressions: Vec<PivotExpression>,
}

impl PivotRowColumnAttribute {
    pub fn new(attribute: PivotAttribute) -> Self {
        PivotRowColumnAttribute {
            attribute,
            ..Default::default()
        }
    }

    pub fn with_sums(mut self, show_sums: bool) -> Self {
        self.show_sums = show_sums;
        self
    }

    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    pub fn with_sort(mut self, sort: PivotSort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_expression(mut self, expression: PivotExpression) -> Self {
        self.expressions.push(expression);
        self
    }
}

/// Attribute whose values are aggregated into the matrix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotValueAttribute {
    #[serde(flatten)]
    pub attribute: PivotAttribute,
    #[serde(default)]
    pub aggregation: AggregationType,
    #[serde(default)]
    pub value_type: Option<ValueType>,
}

impl PivotValueAttribute {
    pub fn new(attribute: PivotAttribute, aggregation: AggregationType) -> Self {
        PivotValueAttribute {
            attribute,
            aggregation,
            value_type: None,
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }
}

// ============================================================================
// SORTING
// ============================================================================

/// One step of the path into the opposite axis when sorting by values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotSortValue {
    pub title: String,
    /// Selects every target index below the current path position.
    pub is_summary: bool,
}

/// Sort a level by the values of one value column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotSortList {
    pub value_title: String,
    pub values: Vec<PivotSortValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotSort {
    #[serde(default)]
    pub attribute: Option<PivotAttribute>,
    #[serde(default)]
    pub list: Option<PivotSortList>,
    #[serde(default = "default_true")]
    pub asc: bool,
}

impl Default for PivotSort {
    fn default() -> Self {
        PivotSort {
            attribute: None,
            list: None,
            asc: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Where an expression is rendered relative to the headers it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExpressionPosition {
    /// Before the first referenced header.
    BeforeHeader,
    /// After the last referenced header.
    #[default]
    AfterHeader,
    /// After the last header of the level.
    StickToEnd,
}

/// Operand of an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PivotOperand {
    /// Headers of the same level whose title matches `value` (regular expression).
    Header { value: String },
    /// Literal number.
    Value { value: f64 },
    /// Nested expression.
    Expression(PivotExpression),
}

/// User-defined derived row or column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotExpression {
    pub title: String,
    pub operation: ExpressionOperation,
    #[serde(default)]
    pub operands: Vec<PivotOperand>,
    #[serde(default)]
    pub position: ExpressionPosition,
    #[serde(default)]
    pub expandable: bool,
}

impl PivotExpression {
    pub fn new(title: impl Into<String>, operation: ExpressionOperation) -> Self {
        PivotExpression {
            title: title.into(),
            operation,
            operands: Vec::new(),
            position: ExpressionPosition::default(),
            expandable: false,
        }
    }

    pub fn header(mut self, pattern: impl Into<String>) -> Self {
        self.operands.push(PivotOperand::Header { value: pattern.into() });
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.operands.push(PivotOperand::Value { value });
        self
    }

    pub fn nested(mut self, expression: PivotExpression) -> Self {
        self.operands.push(PivotOperand::Expression(expression));
        self
    }

    pub fn at(mut self, position: ExpressionPosition) -> Self {
        self.position = position;
        self
    }

    pub fn expandable(mut self, expandable: bool) -> Self {
        self.expandable = expandable;
        self
    }
}

// ============================================================================
// STEM AND PIVOT CONFIG
// ============================================================================

/// Configuration of one independent grouping branch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotStemConfig {
    pub row_attributes: Vec<PivotRowColumnAttribute>,
    pub column_attributes: Vec<PivotRowColumnAttribute>,
    pub value_attributes: Vec<PivotValueAttribute>,
}

impl PivotStemConfig {
    /// A stem with no row, column or value attributes produces nothing.
    pub fn is_empty(&self) -> bool {
        self.row_attributes.is_empty()
            && self.column_attributes.is_empty()
            && self.value_attributes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub stems_configs: Vec<PivotStemConfig>,
    /// Merge stems with identical shapes into one table.
    #[serde(default)]
    pub merge_tables: bool,
}

impl Default for PivotConfig {
    fn default() -> Self {
        PivotConfig {
            version: Some(PIVOT_CONFIG_VERSION.to_string()),
            stems_configs: Vec::new(),
            merge_tables: true,
        }
    }
}

impl PivotConfig {
    /// Parses and validates a configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PivotConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        match self.version.as_deref() {
            None | Some(PIVOT_CONFIG_VERSION) => Ok(()),
            Some(other) => Err(PivotError::UnsupportedVersion(other.to_string())),
        }
    }

    /// Version 1 configuration with `stems` empty stem configs and merging enabled.
    pub fn default_for_stems(stems: usize) -> Self {
        PivotConfig {
            stems_configs: vec![PivotStemConfig::default(); stems],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stems_configs.iter().all(PivotStemConfig::is_empty)
    }
}

/// Whether `current` requires rebuilding the model previously built from `previous`.
pub fn is_pivot_config_changed(previous: &PivotConfig, current: &PivotConfig) -> bool {
    if previous.merge_tables != current.merge_tables && current.stems_configs.len() > 1 {
        return true;
    }
    if previous.stems_configs.len() != current.stems_configs.len() {
        return true;
    }
    previous
        .stems_configs
        .iter()
        .zip(current.stems_configs.iter())
        .any(|(p, c)| stem_config_changed(p, c))
}

fn stem_config_changed(previous: &PivotStemConfig, current: &PivotStemConfig) -> bool {
    let without_header = |attrs: &[PivotRowColumnAttribute]| -> Vec<PivotRowColumnAttribute> {
        attrs
            .iter()
            .map(|a| PivotRowColumnAttribute {
                show_header: false,
                ..a.clone()
            })
            .collect()
    };
    without_header(&previous.row_attributes) != without_header(&current.row_attributes)
        || previous.column_attributes != current.column_attributes
        || previous.value_attributes != current.value_attributes
}

// ============================================================================
// DIMENSION CONFIG
// ============================================================================

/// Per-level settings carried from the config into the built model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotDimensionConfig {
    pub show_sums: bool,
    pub sticky: bool,
    pub sort: Option<PivotSort>,
    pub expressions: Vec<PivotExpression>,
}

impl PivotDimensionConfig {
    pub fn with_sums(show_sums: bool) -> Self {
        PivotDimensionConfig {
            show_sums,
            ..Default::default()
        }
    }
}

/// A level is sticky only if it and every level before it are sticky.
pub fn normalize_sticky(flags: &[bool]) -> Vec<bool> {
    let mut result = Vec::with_capacity(flags.len());
    let mut all_previous = true;
    for &sticky in flags {
        all_previous = all_previous && sticky;
        result.push(all_previous);
    }
    result
}
