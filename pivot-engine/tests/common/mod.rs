//! FILENAME: pivot-engine/tests/common/mod.rs
//! Record-backed data source and fixtures for pivot model integration tests.

#![allow(dead_code)]

use pivot_engine::{
    AggregatedDataValues, AggregatedMap, AggregatedMapData, AggregatedNode, AggregationType,
    AttributeInfo, DataResource, PivotAttribute, PivotDataSource, PivotRowColumnAttribute,
    PivotValueAttribute, ResourceType,
};
use pivot_values::{Constraint, DataValue};
use rustc_hash::FxHashMap;

// ============================================================================
// RECORD SOURCE
// ============================================================================

/// Groups in-memory records the way the external grouping engine does.
/// Keys keep the order in which records first produce them.
#[derive(Debug, Default)]
pub struct RecordSource {
    /// Records per stem index.
    pub stems: Vec<Vec<DataResource>>,
    pub attributes: Vec<AttributeInfo>,
    /// Color per resource id.
    pub colors: FxHashMap<String, String>,
}

impl RecordSource {
    pub fn new(records: Vec<DataResource>) -> Self {
        RecordSource {
            stems: vec![records],
            ..Default::default()
        }
    }

    pub fn with_stem(mut self, records: Vec<DataResource>) -> Self {
        self.stems.push(records);
        self
    }

    pub fn with_attribute(mut self, info: AttributeInfo) -> Self {
        self.attributes.push(info);
        self
    }

    pub fn with_color(mut self, resource_id: &str, color: &str) -> Self {
        self.colors.insert(resource_id.to_string(), color.to_string());
        self
    }

    fn records(&self, stem_index: usize) -> &[DataResource] {
        self.stems.get(stem_index).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PivotDataSource for RecordSource {
    fn aggregate(
        &self,
        stem_index: usize,
        rows: &[PivotRowColumnAttribute],
        columns: &[PivotRowColumnAttribute],
        _values: &[PivotValueAttribute],
    ) -> AggregatedMapData {
        let records: Vec<&DataResource> = self.records(stem_index).iter().collect();
        let levels: Vec<&PivotRowColumnAttribute> = rows.iter().chain(columns).collect();
        let columns_map = if rows.is_empty() {
            AggregatedMap::new()
        } else {
            into_map(group(&records, &columns.iter().collect::<Vec<_>>()))
        };
        AggregatedMapData {
            map: into_map(group(&records, &levels)),
            columns_map,
            row_levels: rows.len(),
            column_levels: columns.len(),
        }
    }

    fn attribute(&self, attribute: &PivotAttribute) -> Option<AttributeInfo> {
        self.attributes
            .iter()
            .find(|a| a.id == attribute.attribute_id)
            .cloned()
    }

    fn resource_color(&self, _stem_index: usize, attribute: &PivotAttribute) -> Option<String> {
        self.colors.get(&attribute.resource_id).cloned()
    }

    fn unique_resources(&self, stem_index: usize, attribute: &PivotAttribute) -> Vec<DataResource> {
        self.records(stem_index)
            .iter()
            .filter(|r| r.resource_id == attribute.resource_id)
            .cloned()
            .collect()
    }
}

fn group(records: &[&DataResource], levels: &[&PivotRowColumnAttribute]) -> AggregatedNode {
    let Some((level, rest)) = levels.split_first() else {
        return AggregatedNode::Values(by_resource(records));
    };

    let mut keys: Vec<String> = Vec::new();
    let mut buckets: FxHashMap<String, Vec<&DataResource>> = FxHashMap::default();
    for &record in records {
        let key = record.value(&level.attribute.attribute_id).display_value();
        if !buckets.contains_key(&key) {
            keys.push(key.clone());
        }
        buckets.entry(key).or_default().push(record);
    }

    let mut map = AggregatedMap::new();
    for key in keys {
        let bucket = buckets.remove(&key).unwrap_or_default();
        map.insert(key, group(&bucket, rest));
    }
    AggregatedNode::Map(map)
}

fn by_resource(records: &[&DataResource]) -> Vec<AggregatedDataValues> {
    let mut out: Vec<AggregatedDataValues> = Vec::new();
    for record in records {
        match out.iter_mut().find(|v| v.resource_id == record.resource_id) {
            Some(values) => values.objects.push((*record).clone()),
            None => out.push(AggregatedDataValues {
                resource_id: record.resource_id.clone(),
                resource_type: ResourceType::Collection,
                objects: vec![(*record).clone()],
            }),
        }
    }
    out
}

fn into_map(node: AggregatedNode) -> AggregatedMap {
    match node {
        AggregatedNode::Map(map) => map,
        AggregatedNode::Values(_) => AggregatedMap::new(),
    }
}

// ============================================================================
// SALES FIXTURE
// ============================================================================

pub const SALES: &str = "sales";

pub struct SalesFixture;

impl SalesFixture {
    pub fn data() -> Vec<(&'static str, &'static str, &'static str, f64, f64)> {
        vec![
            ("North", "Widget", "Q1", 10000.0, 100.0),
            ("North", "Widget", "Q2", 12000.0, 120.0),
            ("North", "Gadget", "Q1", 8000.0, 80.0),
            ("North", "Gadget", "Q2", 9000.0, 90.0),
            ("South", "Widget", "Q1", 15000.0, 150.0),
            ("South", "Widget", "Q2", 14000.0, 140.0),
            ("South", "Gadget", "Q1", 11000.0, 110.0),
            ("South", "Gadget", "Q2", 13000.0, 130.0),
            ("East", "Widget", "Q1", 9000.0, 90.0),
            ("East", "Widget", "Q2", 11000.0, 110.0),
            ("East", "Gadget", "Q1", 7000.0, 70.0),
            ("East", "Gadget", "Q2", 8500.0, 85.0),
        ]
    }

    pub fn records() -> Vec<DataResource> {
        Self::data()
            .into_iter()
            .enumerate()
            .map(|(i, (region, product, quarter, sales, quantity))| {
                DataResource::new(format!("r{}", i), SALES)
                    .with_value("region", region)
                    .with_value("product", product)
                    .with_value("quarter", quarter)
                    .with_value("sales", sales)
                    .with_value("quantity", quantity)
            })
            .collect()
    }

    pub fn source() -> RecordSource {
        RecordSource::new(Self::records())
            .with_attribute(AttributeInfo::new("region", "Region").with_constraint(Constraint::Text))
            .with_attribute(AttributeInfo::new("product", "Product").with_constraint(Constraint::Text))
            .with_attribute(AttributeInfo::new("quarter", "Quarter").with_constraint(Constraint::Text))
            .with_attribute(AttributeInfo::new("sales", "Sales").with_constraint(Constraint::number()))
            .with_attribute(AttributeInfo::new("quantity", "Quantity").with_constraint(Constraint::number()))
            .with_color(SALES, "#3366cc")
    }
}

pub fn group_by(attribute_id: &str) -> PivotRowColumnAttribute {
    PivotRowColumnAttribute::new(PivotAttribute::new(SALES, attribute_id))
}

pub fn measure(attribute_id: &str, aggregation: AggregationType) -> PivotValueAttribute {
    PivotValueAttribute::new(PivotAttribute::new(SALES, attribute_id), aggregation)
}

pub fn number(value: f64) -> DataValue {
    DataValue::Number(value)
}
