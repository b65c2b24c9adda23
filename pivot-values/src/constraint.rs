//! FILENAME: pivot-values/src/constraint.rs
//! PURPOSE: Value constraints: how a value of a given data type is rendered and ordered.
//! CONTEXT: Every header and value column carries a constraint. Attributes with no
//! known metadata fall back to `Constraint::Unknown`, which renders raw text.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::number_format::{format_decimal, format_general, format_percentage};
use crate::value::{compare_text, compare_values, DataValue};

/// Data type descriptor attached to attributes and value columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Constraint {
    #[default]
    Unknown,
    Text,
    #[serde(rename_all = "camelCase")]
    Number {
        #[serde(default)]
        decimals: Option<u8>,
        #[serde(default)]
        thousands_separator: bool,
    },
    Percentage {
        #[serde(default)]
        decimals: Option<u8>,
    },
    Boolean,
}

impl Constraint {
    pub fn number() -> Self {
        Constraint::Number { decimals: None, thousands_separator: false }
    }

    pub fn number_with_decimals(decimals: u8) -> Self {
        Constraint::Number { decimals: Some(decimals), thousands_separator: false }
    }

    pub fn percentage(decimals: u8) -> Self {
        Constraint::Percentage { decimals: Some(decimals) }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Constraint::Number { .. } | Constraint::Percentage { .. })
    }

    /// Renders a value for display in a cell.
    pub fn format(&self, value: &DataValue) -> String {
        match value {
            DataValue::Empty => String::new(),
            DataValue::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    let formatted = self.format(item);
                    if !formatted.is_empty() && !parts.contains(&formatted) {
                        parts.push(formatted);
                    }
                }
                parts.join(", ")
            }
            _ => match self {
                Constraint::Number { decimals, thousands_separator } => match value.as_number() {
                    Some(n) => match decimals {
                        Some(d) => format_decimal(n, *d, *thousands_separator),
                        None if *thousands_separator => {
                            format_decimal(n, decimal_places_of(n), true)
                        }
                        None => format_general(n),
                    },
                    None => value.display_value(),
                },
                Constraint::Percentage { decimals } => match value.as_number() {
                    Some(n) => format_percentage(n, decimals.unwrap_or(2)),
                    None => value.display_value(),
                },
                Constraint::Boolean => match value {
                    DataValue::Boolean(b) => b.to_string(),
                    other => other.display_value(),
                },
                Constraint::Unknown | Constraint::Text => value.display_value(),
            },
        }
    }

    /// Orders two values the way this data type sorts them.
    pub fn compare(&self, a: &DataValue, b: &DataValue) -> Ordering {
        if self.is_numeric() {
            return match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => compare_values(a, b),
            };
        }
        match (a, b) {
            (DataValue::Text(x), DataValue::Text(y)) => compare_text(x, y),
            _ => compare_values(a, b),
        }
    }
}

fn decimal_places_of(n: f64) -> u8 {
    let general = format_general(n);
    general
        .split_once('.')
        .map_or(0, |(_, decimals)| decimals.len().min(10) as u8)
}
