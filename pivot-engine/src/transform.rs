//! FILENAME: pivot-engine/src/transform.rs
//! Caller-supplied formatting hooks.
//!
//! Every method has a literal fallback, so `DefaultTransform` is an empty impl.

use pivot_values::Constraint;
use serde::{Deserialize, Serialize};

use crate::data::PivotDataHeader;
use crate::definition::AggregationType;

/// Title and summary label of a subtotal header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryHeader {
    /// `None` for the grand total.
    pub title: Option<String>,
    pub summary: String,
}

pub trait PivotTransform {
    /// Label of an aggregation inside value titles.
    fn translate_aggregation(&self, aggregation: AggregationType) -> String {
        aggregation.label().to_string()
    }

    /// Labels of the subtotal closing the children of `header` at `level`.
    /// `header` is `None` for the grand total.
    fn format_summary_header(&self, header: Option<&PivotDataHeader>, level: usize) -> SummaryHeader {
        let _ = level;
        SummaryHeader {
            title: header.map(|h| h.title.clone()),
            summary: String::new(),
        }
    }

    fn format_row_header(&self, title: &str, level: usize) -> String {
        let _ = level;
        title.to_string()
    }

    fn format_column_header(&self, title: &str, level: usize) -> String {
        let _ = level;
        title.to_string()
    }

    /// Returns the constraint to use when a config overrides an attribute's own one,
    /// or `None` to keep the original.
    fn check_valid_constraint_override(
        &self,
        original: Option<&Constraint>,
        overridden: &Constraint,
    ) -> Option<Constraint> {
        match original {
            None => Some(overridden.clone()),
            Some(c) if c.is_numeric() && overridden.is_numeric() => Some(overridden.clone()),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransform;

impl PivotTransform for DefaultTransform {}
