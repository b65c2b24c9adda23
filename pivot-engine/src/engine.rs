//! FILENAME: pivot-engine/src/engine.rs
//! Pivot Engine - Builds the pivot model from grouped data.
//!
//! This module takes a PivotConfig (configuration) and a PivotDataSource (data)
//! and produces PivotData (header trees plus a dense values matrix per table).
//!
//! Algorithm:
//! 1. Drop empty stems and group the rest into merge groups by shape
//! 2. Ask the source for each stem's nested map and deep-merge the group's maps
//! 3. Walk the merged map into a row tree and a column tree, numbering leaves
//! 4. Fill the values matrix by walking both trees back into the map
//! 5. Value-only groups skip the trees and aggregate whole resources instead

use log::{debug, warn};
use pivot_values::{Constraint, DataValue};

use crate::aggregation::{aggregate_resources, unique_values};
use crate::data::{
    AggregatedDataValues, AggregatedMap, AggregatedMapData, AggregatedNode, DataResource,
    PivotData, PivotDataHeader, PivotHeaderAttribute, PivotStemData,
};
use crate::definition::{
    normalize_sticky, AggregationType, PivotAttribute, PivotConfig, PivotDimensionConfig,
    PivotRowColumnAttribute, PivotStemConfig, PivotValueAttribute,
};
use crate::source::{AttributeInfo, PivotDataSource};
use crate::transform::PivotTransform;

// ============================================================================
// MERGE GROUPS
// ============================================================================

/// Shape of a stem config; only stems of the same shape can share a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StemShape {
    Values,
    Rows,
    Columns,
    RowsAndColumns,
}

impl StemShape {
    fn of(config: &PivotStemConfig) -> Self {
        match (config.row_attributes.is_empty(), config.column_attributes.is_empty()) {
            (false, false) => StemShape::RowsAndColumns,
            (false, true) => StemShape::Rows,
            (true, false) => StemShape::Columns,
            (true, true) => StemShape::Values,
        }
    }

    fn can_merge(self, first: &PivotStemConfig, other: &PivotStemConfig) -> bool {
        let rows = first.row_attributes.len() == other.row_attributes.len();
        let columns = first.column_attributes.len() == other.column_attributes.len();
        match self {
            StemShape::Rows => rows,
            StemShape::Columns => columns,
            StemShape::Values | StemShape::RowsAndColumns => rows && columns,
        }
    }
}

/// Stems rendered into one table. `stem_indexes` index the original config list.
#[derive(Debug)]
struct MergeGroup<'c> {
    shape: StemShape,
    configs: Vec<&'c PivotStemConfig>,
    stem_indexes: Vec<usize>,
}

fn create_merge_groups(config: &PivotConfig) -> Vec<MergeGroup<'_>> {
    let mut groups: Vec<MergeGroup<'_>> = Vec::new();
    for (stem_index, stem) in config.stems_configs.iter().enumerate() {
        if stem.is_empty() {
            continue;
        }
        let shape = StemShape::of(stem);
        let existing = if config.merge_tables {
            groups
                .iter()
                .position(|g| g.shape == shape && shape.can_merge(g.configs[0], stem))
        } else {
            None
        };
        match existing {
            Some(i) => {
                groups[i].configs.push(stem);
                groups[i].stem_indexes.push(stem_index);
            }
            None => groups.push(MergeGroup {
                shape,
                configs: vec![stem],
                stem_indexes: vec![stem_index],
            }),
        }
    }
    groups
}

// ============================================================================
// NESTED MAP CURSOR
// ============================================================================

/// Position inside the nested map while walking header trees.
#[derive(Debug, Clone, Copy)]
enum Cursor<'m> {
    Map(&'m AggregatedMap),
    Values(&'m [AggregatedDataValues]),
    Missing,
}

impl<'m> Cursor<'m> {
    fn of(node: Option<&'m AggregatedNode>) -> Self {
        match node {
            Some(AggregatedNode::Map(map)) => Cursor::Map(map),
            Some(AggregatedNode::Values(values)) => Cursor::Values(values),
            None => Cursor::Missing,
        }
    }

    fn child(self, key: &str) -> Cursor<'m> {
        match self {
            Cursor::Map(map) => Cursor::of(map.get(key)),
            _ => Cursor::Missing,
        }
    }

    /// Records under `key`, or the records at this position when already at a leaf.
    fn records(self, key: &str) -> &'m [AggregatedDataValues] {
        match self {
            Cursor::Values(values) => values,
            Cursor::Map(_) => match self.child(key) {
                Cursor::Values(values) => values,
                _ => &[],
            },
            Cursor::Missing => &[],
        }
    }

    fn keys(self) -> Vec<&'m str> {
        match self {
            Cursor::Map(map) => map.keys().collect(),
            _ => Vec::new(),
        }
    }
}

/// Number of matrix slots reserved below `cursor` when `remaining` levels follow.
fn count_slots(cursor: Cursor<'_>, remaining: usize, slots_per_leaf: usize) -> usize {
    count_leaves(cursor, remaining) * slots_per_leaf
}

fn count_leaves(cursor: Cursor<'_>, remaining: usize) -> usize {
    if remaining == 0 {
        return 1;
    }
    match cursor {
        Cursor::Map(map) if remaining == 1 => map.len(),
        Cursor::Map(map) => map
            .iter()
            .map(|(_, node)| count_leaves(Cursor::of(Some(node)), remaining - 1))
            .sum(),
        _ => 0,
    }
}

// ============================================================================
// HEADER TREE BUILDER
// ============================================================================

/// Per-level metadata copied onto every header of a level.
#[derive(Debug, Clone, Default)]
struct LevelInfo {
    color: Option<String>,
    constraint: Option<Constraint>,
    attribute_name: Option<String>,
}

struct TreeBuilder<'b> {
    levels: &'b [LevelInfo],
    value_titles: &'b [String],
    value_colors: &'b [Option<String>],
    max_index: usize,
}

impl<'b> TreeBuilder<'b> {
    fn new(levels: &'b [LevelInfo], value_titles: &'b [String], value_colors: &'b [Option<String>]) -> Self {
        TreeBuilder {
            levels,
            value_titles,
            value_colors,
            max_index: 0,
        }
    }

    fn slots_per_leaf(&self) -> usize {
        self.value_titles.len().max(1)
    }

    /// Builds the tree of `depth` levels below `cursor`, numbering from `first_index`.
    fn build(&mut self, cursor: Cursor<'_>, depth: usize, first_index: usize) -> Vec<PivotDataHeader> {
        if depth == 0 {
            if self.value_titles.is_empty() {
                return Vec::new();
            }
            self.max_index = self.value_titles.len() - 1 + first_index;
            return self.value_headers(first_index);
        }
        self.build_level(cursor, 0, depth, first_index)
    }

    fn build_level(&mut self, cursor: Cursor<'_>, level: usize, depth: usize, first_index: usize) -> Vec<PivotDataHeader> {
        let info = self.levels.get(level).cloned().unwrap_or_default();
        let mut headers = Vec::new();
        let mut current = first_index;

        for title in cursor.keys() {
            let child_cursor = cursor.child(title);
            let mut header = PivotDataHeader {
                title: title.to_string(),
                color: info.color.clone(),
                constraint: Some(info.constraint.clone().unwrap_or_default()),
                attribute_name: info.attribute_name.clone(),
                ..Default::default()
            };

            if level + 1 == depth {
                if self.value_titles.len() > 1 {
                    header.children = Some(self.value_headers(current));
                    self.max_index = self.max_index.max(current + self.value_titles.len() - 1);
                } else {
                    header.target_index = Some(current);
                    self.max_index = self.max_index.max(current);
                }
            } else {
                header.children = Some(self.build_level(child_cursor, level + 1, depth, current));
            }

            current += count_slots(child_cursor, depth - (level + 1), self.slots_per_leaf());
            headers.push(header);
        }
        headers
    }

    fn value_headers(&self, first_index: usize) -> Vec<PivotDataHeader> {
        self.value_titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                PivotDataHeader::value_header(
                    title.clone(),
                    first_index + i,
                    self.value_colors.get(i).cloned().flatten(),
                )
            })
            .collect()
    }
}

// ============================================================================
// PIVOT BUILDER
// ============================================================================

/// Settings taken from the first stem of a merge group.
#[derive(Debug, Clone, Default)]
struct DimensionData {
    rows_config: Vec<PivotDimensionConfig>,
    columns_config: Vec<PivotDimensionConfig>,
    row_show_header: Vec<bool>,
    row_levels: Vec<LevelInfo>,
    column_levels: Vec<LevelInfo>,
}

/// Builds pivot models from a configuration and a data source.
pub struct PivotBuilder<'a> {
    source: &'a dyn PivotDataSource,
    transform: &'a dyn PivotTransform,
}

impl<'a> PivotBuilder<'a> {
    pub fn new(source: &'a dyn PivotDataSource, transform: &'a dyn PivotTransform) -> Self {
        PivotBuilder { source, transform }
    }

    /// Builds one stem data per merge group of `config`.
    pub fn build(&self, config: &PivotConfig) -> PivotData {
        let groups = create_merge_groups(config);
        debug!(
            "building pivot: {} stems configured, {} merge groups",
            config.stems_configs.len(),
            groups.len()
        );

        let able_to_merge = groups.len() <= 1;
        let data = groups
            .iter()
            .map(|group| match group.shape {
                StemShape::Values => self.build_values_group(group),
                _ => self.build_group(group),
            })
            .collect();

        PivotData {
            data,
            merge_tables: config.merge_tables,
            able_to_merge,
        }
    }

    fn build_group(&self, group: &MergeGroup<'_>) -> PivotStemData {
        let mut merged: Option<AggregatedMapData> = None;
        let mut value_attributes: Vec<PivotValueAttribute> = Vec::new();
        let mut value_colors: Vec<Option<String>> = Vec::new();

        for (config, &stem_index) in group.configs.iter().zip(&group.stem_indexes) {
            let aggregated = self.source.aggregate(
                stem_index,
                &config.row_attributes,
                &config.column_attributes,
                &config.value_attributes,
            );
            merged = Some(match merged.take() {
                Some(mut m) => {
                    m.merge(aggregated);
                    m
                }
                None => aggregated,
            });

            for value_attribute in &config.value_attributes {
                if !value_attributes.contains(value_attribute) {
                    value_colors.push(self.source.resource_color(stem_index, &value_attribute.attribute));
                    value_attributes.push(value_attribute.clone());
                }
            }
        }

        let dimensions = self.dimension_data(group.configs[0], group.stem_indexes[0]);
        self.build_stem(&merged.unwrap_or_default(), &value_attributes, &value_colors, &dimensions)
    }

    fn dimension_data(&self, config: &PivotStemConfig, stem_index: usize) -> DimensionData {
        DimensionData {
            rows_config: dimension_configs(&config.row_attributes),
            columns_config: dimension_configs(&config.column_attributes),
            row_show_header: config.row_attributes.iter().map(|a| a.show_header).collect(),
            row_levels: self.level_infos(&config.row_attributes, stem_index),
            column_levels: self.level_infos(&config.column_attributes, stem_index),
        }
    }

    fn level_infos(&self, attributes: &[PivotRowColumnAttribute], stem_index: usize) -> Vec<LevelInfo> {
        attributes
            .iter()
            .map(|a| {
                let info = self.source.attribute(&a.attribute);
                LevelInfo {
                    color: self.source.resource_color(stem_index, &a.attribute),
                    constraint: info.as_ref().map(|i| {
                        self.resolve_constraint(&a.attribute, i).unwrap_or_default()
                    }),
                    attribute_name: info.map(|i| i.name),
                }
            })
            .collect()
    }

    /// Attribute constraint with the config's override applied when the transform accepts it.
    fn resolve_constraint(&self, attribute: &PivotAttribute, info: &AttributeInfo) -> Option<Constraint> {
        let overridden = attribute.constraint.as_ref().and_then(|c| {
            self.transform
                .check_valid_constraint_override(info.constraint.as_ref(), c)
        });
        overridden.or_else(|| info.constraint.clone())
    }

    fn attribute_constraint(&self, attribute: &PivotAttribute) -> Option<Constraint> {
        self.source
            .attribute(attribute)
            .and_then(|info| self.resolve_constraint(attribute, &info))
    }

    fn value_titles(&self, value_attributes: &[PivotValueAttribute]) -> (Vec<String>, Vec<Option<Constraint>>) {
        value_attributes
            .iter()
            .map(|v| {
                let name = self
                    .source
                    .attribute(&v.attribute)
                    .map(|i| i.name)
                    .unwrap_or_default();
                let label = self.transform.translate_aggregation(v.aggregation);
                let title = format!("{} {}", label, name).trim().to_string();
                let constraint = v
                    .aggregation
                    .constraint()
                    .or_else(|| self.attribute_constraint(&v.attribute));
                (title, constraint)
            })
            .unzip()
    }

    fn build_stem(
        &self,
        aggregated: &AggregatedMapData,
        value_attributes: &[PivotValueAttribute],
        value_colors: &[Option<String>],
        dimensions: &DimensionData,
    ) -> PivotStemData {
        let (value_titles, values_constraints) = self.value_titles(value_attributes);

        let mut row_builder = TreeBuilder::new(&dimensions.row_levels, &[], value_colors);
        let row_headers = row_builder.build(Cursor::Map(&aggregated.map), aggregated.row_levels, 0);

        let column_map = if aggregated.row_levels > 0 {
            &aggregated.columns_map
        } else {
            &aggregated.map
        };
        let mut column_builder = TreeBuilder::new(&dimensions.column_levels, &value_titles, value_colors);
        let column_headers = column_builder.build(Cursor::Map(column_map), aggregated.column_levels, 0);

        let rows = row_builder.max_index + 1;
        let columns = column_builder.max_index + 1;
        let mut matrix = ValuesMatrix::new(rows, columns);
        if !value_attributes.is_empty() {
            let filler = ValuesFiller {
                value_attributes,
                column_headers: &column_headers,
            };
            if row_headers.is_empty() {
                filler.fill_columns(&mut matrix, &column_headers, 0, Cursor::Map(&aggregated.map));
            } else {
                filler.fill_rows(&mut matrix, &row_headers, Cursor::Map(&aggregated.map));
            }
        }

        let row_header_attributes = dimensions
            .row_show_header
            .iter()
            .zip(&dimensions.row_levels)
            .map(|(&show, level)| {
                show.then(|| PivotHeaderAttribute {
                    title: level.attribute_name.clone().unwrap_or_default(),
                    color: level.color.clone(),
                })
            })
            .collect();

        let has_additional_column_level = (aggregated.column_levels == 0 && !value_titles.is_empty())
            || (aggregated.column_levels > 0 && value_titles.len() > 1);

        debug!(
            "built stem: {}x{} matrix, {} row levels, {} column levels, {} values",
            rows,
            columns,
            aggregated.row_levels,
            aggregated.column_levels,
            value_titles.len()
        );

        let stem = PivotStemData {
            row_headers,
            row_header_attributes,
            column_headers,
            column_header_attributes: vec![None; dimensions.columns_config.len()],
            value_titles,
            values: matrix.values,
            data_resources: matrix.resources,
            values_constraints,
            value_types: value_attributes
                .iter()
                .map(|v| v.value_type.unwrap_or_default())
                .collect(),
            value_aggregations: value_attributes.iter().map(|v| v.aggregation).collect(),
            rows_config: dimensions.rows_config.clone(),
            columns_config: dimensions.columns_config.clone(),
            has_additional_column_level,
        };
        if let Err(err) = stem.validate() {
            warn!("pivot model inconsistent: {}", err);
        }
        stem
    }

    /// Value-only stems: one synthetic column per value attribute and a single row.
    fn build_values_group(&self, group: &MergeGroup<'_>) -> PivotStemData {
        let mut stem = PivotStemData {
            has_additional_column_level: true,
            ..Default::default()
        };
        let mut values = Vec::new();
        let mut resources = Vec::new();

        for (config, &stem_index) in group.configs.iter().zip(&group.stem_indexes) {
            let attributes = &config.value_attributes;
            let colors: Vec<Option<String>> = attributes
                .iter()
                .map(|v| self.source.resource_color(stem_index, &v.attribute))
                .collect();
            let (titles, constraints) = self.value_titles(attributes);

            let mut builder = TreeBuilder::new(&[], &titles, &colors);
            let first_index = stem.column_headers.len();
            stem.column_headers.extend(builder.build(Cursor::Missing, 0, first_index));

            for value_attribute in attributes {
                let records: Vec<DataResource> = self
                    .source
                    .unique_resources(stem_index, &value_attribute.attribute)
                    .into_iter()
                    .filter(|r| r.resource_id == value_attribute.attribute.resource_id)
                    .collect();
                values.push(aggregate_resources(
                    value_attribute.aggregation,
                    &records,
                    &value_attribute.attribute.attribute_id,
                ));
                resources.push(records);
            }

            stem.value_titles.extend(titles);
            stem.values_constraints.extend(constraints);
            stem.value_types
                .extend(attributes.iter().map(|v| v.value_type.unwrap_or_default()));
            stem.value_aggregations
                .extend(attributes.iter().map(|v| v.aggregation));
        }

        stem.values = vec![values];
        stem.data_resources = vec![resources];
        debug!("built value-only stem with {} values", stem.value_titles.len());
        stem
    }
}

fn dimension_configs(attributes: &[PivotRowColumnAttribute]) -> Vec<PivotDimensionConfig> {
    let sticky = normalize_sticky(&attributes.iter().map(|a| a.sticky).collect::<Vec<_>>());
    attributes
        .iter()
        .zip(sticky)
        .map(|(a, sticky)| PivotDimensionConfig {
            show_sums: a.show_sums,
            sticky,
            sort: a.sort.clone(),
            expressions: a.expressions.clone(),
        })
        .collect()
}

// ============================================================================
// VALUES MATRIX
// ============================================================================

struct ValuesMatrix {
    values: Vec<Vec<DataValue>>,
    resources: Vec<Vec<Vec<DataResource>>>,
}

impl ValuesMatrix {
    fn new(rows: usize, columns: usize) -> Self {
        ValuesMatrix {
            values: vec![vec![DataValue::Empty; columns]; rows],
            resources: vec![vec![Vec::new(); columns]; rows],
        }
    }

    fn set(&mut self, row: usize, column: usize, value: DataValue, resources: Vec<DataResource>) {
        if let Some(cell) = self.values.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
        if let Some(cell) = self.resources.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = resources;
        }
    }
}

struct ValuesFiller<'f> {
    value_attributes: &'f [PivotValueAttribute],
    column_headers: &'f [PivotDataHeader],
}

impl<'f> ValuesFiller<'f> {
    fn fill_rows(&self, matrix: &mut ValuesMatrix, headers: &[PivotDataHeader], cursor: Cursor<'_>) {
        for header in headers {
            let row_cursor = cursor.child(&header.title);
            match (&header.children, header.target_index) {
                (Some(children), _) => self.fill_rows(matrix, children, row_cursor),
                (None, Some(row)) if !self.column_headers.is_empty() => {
                    self.fill_columns(matrix, self.column_headers, row, row_cursor)
                }
                _ => {}
            }
        }
    }

    fn fill_columns(&self, matrix: &mut ValuesMatrix, headers: &[PivotDataHeader], row: usize, cursor: Cursor<'_>) {
        for header in headers {
            match (&header.children, header.target_index) {
                (Some(children), _) => {
                    self.fill_columns(matrix, children, row, cursor.child(&header.title))
                }
                (None, Some(column)) => {
                    let value_attribute = &self.value_attributes[column % self.value_attributes.len()];
                    if let Some((value, resources)) = aggregate_cell(value_attribute, cursor.records(&header.title)) {
                        matrix.set(row, column, value, resources);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Aggregates the records of `value_attribute`'s resource. `None` when that resource
/// contributed nothing to the cell.
fn aggregate_cell(
    value_attribute: &PivotValueAttribute,
    records: &[AggregatedDataValues],
) -> Option<(DataValue, Vec<DataResource>)> {
    let attribute = &value_attribute.attribute;
    let matching: Vec<&AggregatedDataValues> = records
        .iter()
        .filter(|r| r.resource_id == attribute.resource_id && r.resource_type == attribute.resource_type)
        .collect();
    if matching.is_empty() {
        return None;
    }

    let resources: Vec<DataResource> = matching
        .iter()
        .flat_map(|r| r.objects.iter().cloned())
        .collect();

    let value = if value_attribute.aggregation == AggregationType::Join {
        let mut raw = Vec::new();
        for resource in &resources {
            resource.value(&attribute.attribute_id).flatten_into(&mut raw);
        }
        DataValue::List(unique_values(raw))
    } else {
        aggregate_resources(value_attribute.aggregation, &resources, &attribute.attribute_id)
    };
    Some((value, resources))
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Builds the pivot model for every non-empty stem of `config`.
/// This is the main entry point for the model builder.
pub fn create_data(
    config: &PivotConfig,
    source: &dyn PivotDataSource,
    transform: &dyn PivotTransform,
) -> PivotData {
    PivotBuilder::new(source, transform).build(config)
}

/// Builds one stem from an already aggregated map.
pub fn build_stem_data(
    aggregated: &AggregatedMapData,
    value_attributes: &[PivotValueAttribute],
    row_attributes: &[PivotRowColumnAttribute],
    column_attributes: &[PivotRowColumnAttribute],
    source: &dyn PivotDataSource,
    transform: &dyn PivotTransform,
) -> PivotStemData {
    let builder = PivotBuilder::new(source, transform);
    let config = PivotStemConfig {
        row_attributes: row_attributes.to_vec(),
        column_attributes: column_attributes.to_vec(),
        value_attributes: value_attributes.to_vec(),
    };
    let value_colors: Vec<Option<String>> = value_attributes
        .iter()
        .map(|v| source.resource_color(0, &v.attribute))
        .collect();
    let dimensions = builder.dimension_data(&config, 0);
    builder.build_stem(aggregated, value_attributes, &value_colors, &dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ResourceType;
    use crate::transform::DefaultTransform;

    /// Source answering from a fixed map; every attribute is named after its id.
    struct FixedSource {
        data: AggregatedMapData,
    }

    impl PivotDataSource for FixedSource {
        fn aggregate(
            &self,
            _stem_index: usize,
            _rows: &[PivotRowColumnAttribute],
            _columns: &[PivotRowColumnAttribute],
            _values: &[PivotValueAttribute],
        ) -> AggregatedMapData {
            self.data.clone()
        }

        fn attribute(&self, attribute: &PivotAttribute) -> Option<AttributeInfo> {
            Some(AttributeInfo::new(&attribute.attribute_id, attribute.attribute_id.to_uppercase()))
        }

        fn resource_color(&self, _stem_index: usize, _attribute: &PivotAttribute) -> Option<String> {
            Some("#3366cc".to_string())
        }

        fn unique_resources(&self, _stem_index: usize, attribute: &PivotAttribute) -> Vec<DataResource> {
            vec![
                DataResource::new("1", &attribute.resource_id).with_value("v", 2.0),
                DataResource::new("2", &attribute.resource_id).with_value("v", 3.0),
                DataResource::new("3", "other").with_value("v", 100.0),
            ]
        }
    }

    fn records(values: &[f64]) -> AggregatedNode {
        AggregatedNode::Values(vec![AggregatedDataValues {
            resource_id: "c".to_string(),
            resource_type: ResourceType::Collection,
            objects: values
                .iter()
                .enumerate()
                .map(|(i, v)| DataResource::new(i.to_string(), "c").with_value("v", *v))
                .collect(),
        }])
    }

    fn row_attr(id: &str) -> PivotRowColumnAttribute {
        PivotRowColumnAttribute::new(PivotAttribute::new("c", id))
    }

    fn value_attr(aggregation: AggregationType) -> PivotValueAttribute {
        PivotValueAttribute::new(PivotAttribute::new("c", "v"), aggregation)
    }

    /// rows: A -> {x: [1,2], y: [3]}, B -> {x: [4]}
    fn rows_and_columns() -> AggregatedMapData {
        let mut map = AggregatedMap::new();
        map.entry_map("A").insert("x", records(&[1.0, 2.0]));
        map.entry_map("A").insert("y", records(&[3.0]));
        map.entry_map("B").insert("x", records(&[4.0]));
        let mut columns_map = AggregatedMap::new();
        columns_map.insert("x", records(&[1.0, 2.0, 4.0]));
        columns_map.insert("y", records(&[3.0]));
        AggregatedMapData { map, columns_map, row_levels: 1, column_levels: 1 }
    }

    #[test]
    fn test_count_leaves() {
        let data = rows_and_columns();
        assert_eq!(count_leaves(Cursor::Map(&data.map), 1), 2);
        assert_eq!(count_leaves(Cursor::Map(&data.map), 2), 3);
        assert_eq!(count_leaves(Cursor::Missing, 0), 1);
    }

    #[test]
    fn test_build_rows_and_columns() {
        let source = FixedSource { data: rows_and_columns() };
        let stem = build_stem_data(
            &source.data,
            &[value_attr(AggregationType::Sum)],
            &[row_attr("r")],
            &[row_attr("k")],
            &source,
            &DefaultTransform,
        );

        assert_eq!(stem.row_headers.len(), 2);
        assert_eq!(stem.row_headers[0].target_index, Some(0));
        assert_eq!(stem.row_headers[1].target_index, Some(1));
        assert_eq!(stem.column_headers.iter().map(|h| h.title.as_str()).collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(stem.value_titles, vec!["sum V"]);
        assert_eq!(
            stem.values,
            vec![
                vec![DataValue::Number(3.0), DataValue::Number(3.0)],
                vec![DataValue::Number(4.0), DataValue::Empty],
            ]
        );
        assert_eq!(stem.data_resources[0][0].len(), 2);
        assert!(!stem.has_additional_column_level);
        assert_eq!(stem.row_headers[0].attribute_name.as_deref(), Some("R"));
        assert_eq!(stem.row_headers[0].color.as_deref(), Some("#3366cc"));
    }

    #[test]
    fn test_multiple_values_reserve_columns() {
        let source = FixedSource { data: rows_and_columns() };
        let stem = build_stem_data(
            &source.data,
            &[value_attr(AggregationType::Sum), value_attr(AggregationType::Count)],
            &[row_attr("r")],
            &[row_attr("k")],
            &source,
            &DefaultTransform,
        );

        assert!(stem.has_additional_column_level);
        let y = &stem.column_headers[1];
        assert_eq!(y.target_indexes(), vec![2, 3]);
        assert!(y.children()[0].is_value_header);
        assert_eq!(stem.values[0].len(), 4);
        assert_eq!(stem.values[0][2], DataValue::Number(3.0));
        assert_eq!(stem.values[0][3], DataValue::Number(1.0));
        assert_eq!(stem.values_constraints[1], Some(Constraint::number()));
    }

    #[test]
    fn test_join_keeps_unique_raw_values() {
        let mut map = AggregatedMap::new();
        map.insert("A", records(&[1.0, 1.0, 2.0]));
        let data = AggregatedMapData { map, row_levels: 1, ..Default::default() };
        let source = FixedSource { data };
        let stem = build_stem_data(
            &source.data,
            &[value_attr(AggregationType::Join)],
            &[row_attr("r")],
            &[],
            &source,
            &DefaultTransform,
        );
        assert_eq!(stem.values[0][0], DataValue::List(vec![1.0.into(), 2.0.into()]));
        assert!(stem.has_additional_column_level);
    }

    #[test]
    fn test_create_data_merges_compatible_stems() {
        let source = FixedSource { data: rows_and_columns() };
        let stem = PivotStemConfig {
            row_attributes: vec![row_attr("r")],
            column_attributes: vec![row_attr("k")],
            value_attributes: vec![value_attr(AggregationType::Sum)],
        };
        let mut config = PivotConfig::default_for_stems(0);
        config.stems_configs = vec![stem.clone(), PivotStemConfig::default(), stem.clone()];

        let data = create_data(&config, &source, &DefaultTransform);
        assert_eq!(data.data.len(), 1);
        assert!(data.able_to_merge);
        // merged maps concatenate records, so every leaf doubles
        assert_eq!(data.data[0].values[0][0], DataValue::Number(6.0));
        assert_eq!(data.data[0].value_titles.len(), 1);

        config.merge_tables = false;
        let separate = create_data(&config, &source, &DefaultTransform);
        assert_eq!(separate.data.len(), 2);
        assert!(!separate.able_to_merge);
    }

    #[test]
    fn test_values_only_stem() {
        let source = FixedSource { data: AggregatedMapData::default() };
        let mut config = PivotConfig::default_for_stems(1);
        config.stems_configs[0].value_attributes =
            vec![value_attr(AggregationType::Sum), value_attr(AggregationType::Count)];

        let data = create_data(&config, &source, &DefaultTransform);
        let stem = &data.data[0];
        assert!(stem.has_additional_column_level);
        assert!(stem.row_headers.is_empty());
        assert_eq!(stem.column_headers.len(), 2);
        assert_eq!(stem.column_headers[1].target_index, Some(1));
        assert_eq!(stem.values, vec![vec![DataValue::Number(5.0), DataValue::Number(2.0)]]);
    }

    #[test]
    fn test_sticky_and_header_attributes() {
        let source = FixedSource { data: rows_and_columns() };
        let mut first = row_attr("r").with_sticky(false);
        first.show_header = true;
        let second = row_attr("s").with_sticky(true);
        let config = PivotStemConfig {
            row_attributes: vec![first, second],
            ..Default::default()
        };
        let builder = PivotBuilder::new(&source, &DefaultTransform);
        let dims = builder.dimension_data(&config, 0);
        assert!(!dims.rows_config[1].sticky);
        let stem = builder.build_stem(&source.data, &[], &[], &dims);
        assert_eq!(
            stem.row_header_attributes[0],
            Some(PivotHeaderAttribute { title: "R".to_string(), color: Some("#3366cc".to_string()) })
        );
        assert_eq!(stem.row_header_attributes[1], None);
    }
}
