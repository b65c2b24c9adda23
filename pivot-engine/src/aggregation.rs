//! FILENAME: pivot-engine/src/aggregation.rs
//! Aggregation of raw records and of already aggregated cell values.
//!
//! Leaf cells aggregate the records the data source grouped under them.
//! Subtotals, grand totals and group intersections re-aggregate the raw leaf
//! values with `AggregationType::for_groups`.

use pivot_values::DataValue;
use rustc_hash::FxHashSet;

use crate::data::DataResource;
use crate::definition::AggregationType;

// ============================================================================
// AGGREGATE ACCUMULATOR
// ============================================================================

/// Accumulator for computing aggregates incrementally.
/// Stores intermediate state needed for all numeric aggregation types.
#[derive(Debug, Clone, Default)]
pub struct AggregateAccumulator {
    pub sum: f64,
    pub count: u64,
    pub count_numbers: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub product: Option<f64>,
    /// For variance/stddev: sum of squared differences from mean.
    /// Using Welford's algorithm for numerical stability.
    pub m2: f64,
    pub mean: f64,
    /// Kept for the median.
    numbers: Vec<f64>,
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value; non-numeric values only count.
    pub fn add(&mut self, value: &DataValue) {
        match value.as_number() {
            Some(n) => self.add_number(n),
            None if !value.is_empty() => self.count += 1,
            None => {}
        }
    }

    pub fn add_number(&mut self, value: f64) {
        self.count += 1;
        self.count_numbers += 1;
        self.sum += value;

        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.product = Some(self.product.map_or(value, |p| p * value));

        // Welford's algorithm for variance
        let delta = value - self.mean;
        self.mean += delta / (self.count_numbers as f64);
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        self.numbers.push(value);
    }

    /// Computes the final aggregate. Aggregations over no numbers yield
    /// `DataValue::Empty`, except `Sum` and `Count` which yield zero.
    pub fn compute(&self, aggregation: AggregationType) -> DataValue {
        let n = self.count_numbers;
        let value = match aggregation {
            AggregationType::Sum => Some(self.sum),
            AggregationType::Count | AggregationType::Unique => Some(self.count as f64),
            AggregationType::Avg => (n > 0).then(|| self.sum / n as f64),
            AggregationType::Min => self.min,
            AggregationType::Max => self.max,
            AggregationType::Product => self.product,
            AggregationType::Median => median(&self.numbers),
            AggregationType::Var => match n {
                0 => None,
                1 => Some(0.0),
                _ => Some(self.m2 / (n - 1) as f64),
            },
            AggregationType::StdDev => match n {
                0 => None,
                1 => Some(0.0),
                _ => Some((self.m2 / (n - 1) as f64).sqrt()),
            },
            AggregationType::Join => None,
        };
        value.map_or(DataValue::Empty, DataValue::Number)
    }
}

fn median(numbers: &[f64]) -> Option<f64> {
    if numbers.is_empty() {
        return None;
    }
    let mut sorted = numbers.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Aggregates a list of values. Lists inside `values` are flattened first.
pub fn aggregate_values(aggregation: AggregationType, values: &[DataValue]) -> DataValue {
    let mut flat = Vec::with_capacity(values.len());
    for value in values {
        value.flatten_into(&mut flat);
    }

    match aggregation {
        AggregationType::Count => {
            DataValue::Number(flat.iter().filter(|v| !v.is_empty()).count() as f64)
        }
        AggregationType::Unique => {
            let distinct: FxHashSet<String> = flat
                .iter()
                .filter(|v| !v.is_empty())
                .map(DataValue::display_value)
                .collect();
            DataValue::Number(distinct.len() as f64)
        }
        AggregationType::Join => DataValue::List(unique_values(flat)),
        _ => {
            let mut accumulator = AggregateAccumulator::new();
            for value in &flat {
                accumulator.add(value);
            }
            accumulator.compute(aggregation)
        }
    }
}

/// Aggregates attribute `attribute_id` over raw records.
/// `Count` counts records, not values.
pub fn aggregate_resources(
    aggregation: AggregationType,
    resources: &[DataResource],
    attribute_id: &str,
) -> DataValue {
    if aggregation == AggregationType::Count {
        return DataValue::Number(resources.len() as f64);
    }
    let values: Vec<DataValue> = resources
        .iter()
        .map(|r| r.value(attribute_id).clone())
        .collect();
    aggregate_values(aggregation, &values)
}

/// De-duplicated non-empty values in first-seen order.
pub fn unique_values(values: Vec<DataValue>) -> Vec<DataValue> {
    let mut out: Vec<DataValue> = Vec::with_capacity(values.len());
    for value in values {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> Vec<DataValue> {
        values.iter().copied().map(DataValue::Number).collect()
    }

    #[test]
    fn test_basic_aggregations() {
        let values = numbers(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(aggregate_values(AggregationType::Sum, &values), DataValue::Number(10.0));
        assert_eq!(aggregate_values(AggregationType::Avg, &values), DataValue::Number(2.5));
        assert_eq!(aggregate_values(AggregationType::Min, &values), DataValue::Number(1.0));
        assert_eq!(aggregate_values(AggregationType::Max, &values), DataValue::Number(4.0));
        assert_eq!(aggregate_values(AggregationType::Median, &values), DataValue::Number(2.5));
        assert_eq!(aggregate_values(AggregationType::Product, &values), DataValue::Number(24.0));
        assert_eq!(aggregate_values(AggregationType::Count, &values), DataValue::Number(4.0));
    }

    #[test]
    fn test_variance_and_stddev() {
        let values = numbers(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let var = aggregate_values(AggregationType::Var, &values).as_number().unwrap();
        assert!((var - 32.0 / 7.0).abs() < 1e-9);
        let std = aggregate_values(AggregationType::StdDev, &values).as_number().unwrap();
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(aggregate_values(AggregationType::Sum, &[]), DataValue::Number(0.0));
        assert_eq!(aggregate_values(AggregationType::Avg, &[]), DataValue::Empty);
        assert_eq!(aggregate_values(AggregationType::Max, &[DataValue::Empty]), DataValue::Empty);
    }

    #[test]
    fn test_lists_are_flattened() {
        let values = vec![DataValue::List(numbers(&[1.0, 2.0])), DataValue::Number(3.0)];
        assert_eq!(aggregate_values(AggregationType::Sum, &values), DataValue::Number(6.0));
    }

    #[test]
    fn test_unique_and_join() {
        let values = vec!["x".into(), "y".into(), "x".into(), DataValue::Empty];
        assert_eq!(aggregate_values(AggregationType::Unique, &values), DataValue::Number(2.0));
        assert_eq!(
            aggregate_values(AggregationType::Join, &values),
            DataValue::List(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn test_count_resources_counts_records() {
        let resources = vec![
            DataResource::new("1", "c").with_value("a", 5.0),
            DataResource::new("2", "c"),
        ];
        assert_eq!(aggregate_resources(AggregationType::Count, &resources, "a"), DataValue::Number(2.0));
        assert_eq!(aggregate_resources(AggregationType::Sum, &resources, "a"), DataValue::Number(5.0));
    }
}
