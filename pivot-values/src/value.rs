//! FILENAME: pivot-values/src/value.rs
//! PURPOSE: Defines the scalar value carried by records, matrix cells and headers.
//! CONTEXT: `DataValue` is what the aggregation adapter hands us for a record field
//! and what the model builder stores in the dense values matrix. A `List` holds the
//! de-duplicated raw values of a Join aggregation until the layout engine formats it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A raw or aggregated value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    Text(String),
    List(Vec<DataValue>),
}

impl DataValue {
    pub fn text(value: impl Into<String>) -> Self {
        DataValue::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DataValue::Empty)
    }

    /// Numeric view of the value. Numeric text counts as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DataValue::Number(n) if n.is_finite() => Some(*n),
            DataValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_number().is_some()
    }

    /// True for numbers with a fractional part.
    pub fn is_decimal(&self) -> bool {
        self.as_number().map_or(false, |n| n.fract() != 0.0)
    }

    /// Returns the display value as a String.
    pub fn display_value(&self) -> String {
        match self {
            DataValue::Empty => String::new(),
            DataValue::Boolean(b) => b.to_string(),
            DataValue::Number(n) => display_number(*n),
            DataValue::Text(s) => s.clone(),
            DataValue::List(items) => items
                .iter()
                .map(DataValue::display_value)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Flattens nested lists into their scalar items.
    pub fn flatten_into(&self, out: &mut Vec<DataValue>) {
        match self {
            DataValue::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            other => out.push(other.clone()),
        }
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Number(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Number(value as f64)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Text(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Boolean(value)
    }
}

fn display_number(n: f64) -> String {
    if n.is_nan() {
        return String::new();
    }
    // Format without unnecessary decimal places
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Total ordering used when sorting values: Empty < Number < Text < Boolean < List.
pub fn compare_values(a: &DataValue, b: &DataValue) -> Ordering {
    match (a, b) {
        (DataValue::Empty, DataValue::Empty) => Ordering::Equal,
        (DataValue::Empty, _) => Ordering::Less,
        (_, DataValue::Empty) => Ordering::Greater,

        (DataValue::Number(na), DataValue::Number(nb)) => {
            na.partial_cmp(nb).unwrap_or(Ordering::Equal)
        }
        (DataValue::Number(_), _) => Ordering::Less,
        (_, DataValue::Number(_)) => Ordering::Greater,

        (DataValue::Text(ta), DataValue::Text(tb)) => compare_text(ta, tb),
        (DataValue::Text(_), _) => Ordering::Less,
        (_, DataValue::Text(_)) => Ordering::Greater,

        (DataValue::Boolean(ba), DataValue::Boolean(bb)) => ba.cmp(bb),
        (DataValue::Boolean(_), _) => Ordering::Less,
        (_, DataValue::Boolean(_)) => Ordering::Greater,

        (DataValue::List(la), DataValue::List(lb)) => la
            .iter()
            .zip(lb.iter())
            .map(|(x, y)| compare_values(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| la.len().cmp(&lb.len())),
    }
}

/// Case-insensitive comparison with a case-sensitive tie-break.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
