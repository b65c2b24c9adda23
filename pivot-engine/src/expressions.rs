//! FILENAME: pivot-engine/src/expressions.rs
//! Derived rows and columns.
//!
//! Configured expressions are resolved against the sibling headers of their level
//! and attached to one of those siblings. Values are not computed here: the layout
//! engine evaluates an attached expression through an `OperandResolver` when it
//! fills the expression's cells.

use log::{debug, warn};
use regex::Regex;
use smallvec::SmallVec;

use crate::data::{DataResource, HeaderExpression, HeaderOperand, PivotDataHeader, PivotStemData};
use crate::definition::{
    ExpressionOperation, ExpressionPosition, PivotDimensionConfig, PivotExpression, PivotOperand,
};
use crate::error::{PivotError, Result};

// ============================================================================
// PATTERN MATCHING
// ============================================================================

/// Compiles a header operand pattern.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| PivotError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Title matcher; patterns that fail to compile match as plain substrings.
enum TitleMatcher {
    Regex(Regex),
    Substring(String),
}

impl TitleMatcher {
    fn new(pattern: &str) -> Self {
        match compile_pattern(pattern) {
            Ok(regex) => TitleMatcher::Regex(regex),
            Err(err) => {
                warn!("{}, matching as plain text", err);
                TitleMatcher::Substring(pattern.to_string())
            }
        }
    }

    fn matches(&self, title: &str) -> bool {
        match self {
            TitleMatcher::Regex(regex) => regex.is_match(title),
            TitleMatcher::Substring(text) => title.contains(text.as_str()),
        }
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Resolves `expression` against `headers`. Returns the resolved expression with
/// the sibling indexes its header operands matched, in order.
pub fn extend_expression(expression: &PivotExpression, headers: &[PivotDataHeader]) -> (HeaderExpression, Vec<usize>) {
    let mut matched = Vec::new();
    let resolved = resolve(expression, headers, &mut matched);
    matched.sort_unstable();
    matched.dedup();
    (resolved, matched)
}

fn resolve(expression: &PivotExpression, headers: &[PivotDataHeader], matched: &mut Vec<usize>) -> HeaderExpression {
    let operands = expression
        .operands
        .iter()
        .map(|operand| match operand {
            PivotOperand::Header { value } => {
                let matcher = TitleMatcher::new(value);
                let mut found: SmallVec<[PivotDataHeader; 2]> = SmallVec::new();
                for (i, header) in headers.iter().enumerate() {
                    if matcher.matches(&header.title) {
                        matched.push(i);
                        found.push(header.clone());
                    }
                }
                HeaderOperand::Header {
                    pattern: value.clone(),
                    headers: found,
                }
            }
            PivotOperand::Value { value } => HeaderOperand::Value { value: *value },
            PivotOperand::Expression(nested) => HeaderOperand::Expression(resolve(nested, headers, matched)),
        })
        .collect();

    HeaderExpression {
        title: expression.title.clone(),
        operation: expression.operation,
        operands,
        position: expression.position,
        expandable: expression.expandable,
    }
}

/// Attaches the expressions of every configured level to the header trees.
pub fn inject_expressions(mut data: PivotStemData) -> PivotStemData {
    data.row_headers = fill_headers(&data.row_headers, &data.rows_config, 0);
    data.column_headers = fill_headers(&data.column_headers, &data.columns_config, 0);
    data
}

fn fill_headers(headers: &[PivotDataHeader], configs: &[PivotDimensionConfig], level: usize) -> Vec<PivotDataHeader> {
    let mut result = headers.to_vec();
    let expressions = configs.get(level).map_or(&[][..], |c| c.expressions.as_slice());

    for expression in expressions {
        let (resolved, matched) = extend_expression(expression, headers);
        let (Some(&first), Some(&last)) = (matched.first(), matched.last()) else {
            debug!("expression '{}' matches no header at level {}", expression.title, level);
            continue;
        };
        let owner = match expression.position {
            ExpressionPosition::BeforeHeader => first,
            ExpressionPosition::AfterHeader => last,
            ExpressionPosition::StickToEnd => headers.len() - 1,
        };
        result[owner].expressions.push(resolved);
    }

    if level + 1 < configs.len() {
        for header in &mut result {
            if let Some(children) = &header.children {
                header.children = Some(fill_headers(children, configs, level + 1));
            }
        }
    }
    result
}

// ============================================================================
// EVALUATION
// ============================================================================

/// Value of an expression or operand, with the records and grid indexes it touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    pub data_resources: Vec<DataResource>,
    pub indexes: Vec<usize>,
}

/// Supplies values for header operands.
pub trait OperandResolver {
    /// Aggregate of the leaves below `headers`. Absent values count as zero.
    fn resolve_headers(&self, headers: &[PivotDataHeader]) -> Evaluation;
}

/// Reduces the operands of `expression` with its operation.
/// `add` starts from zero; the other operations start from the first operand.
/// Division by zero keeps the running value.
pub fn evaluate_expression(expression: &HeaderExpression, resolver: &dyn OperandResolver) -> Evaluation {
    let mut result = Evaluation::default();
    for (index, operand) in expression.operands.iter().enumerate() {
        let evaluation = evaluate_operand(operand, resolver);
        let value = evaluation.value;
        result.data_resources.extend(evaluation.data_resources);
        result.indexes.extend(evaluation.indexes);

        result.value = match expression.operation {
            ExpressionOperation::Add => result.value + value,
            _ if index == 0 => value,
            ExpressionOperation::Subtract => result.value - value,
            ExpressionOperation::Multiply => result.value * value,
            ExpressionOperation::Divide if value == 0.0 => result.value,
            ExpressionOperation::Divide => result.value / value,
        };
    }
    result
}

fn evaluate_operand(operand: &HeaderOperand, resolver: &dyn OperandResolver) -> Evaluation {
    match operand {
        HeaderOperand::Header { headers, .. } => resolver.resolve_headers(headers),
        HeaderOperand::Value { value } => Evaluation {
            value: *value,
            ..Default::default()
        },
        HeaderOperand::Expression(nested) => evaluate_expression(nested, resolver),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ExpressionOperation::*;

    fn level(titles: &[&str]) -> Vec<PivotDataHeader> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| PivotDataHeader::leaf(*t, i))
            .collect()
    }

    /// Each leaf is worth its target index plus one.
    struct IndexResolver;

    impl OperandResolver for IndexResolver {
        fn resolve_headers(&self, headers: &[PivotDataHeader]) -> Evaluation {
            let indexes: Vec<usize> = headers.iter().flat_map(|h| h.target_indexes()).collect();
            Evaluation {
                value: indexes.iter().map(|i| (*i + 1) as f64).sum(),
                indexes,
                ..Default::default()
            }
        }
    }

    fn config(expression: PivotExpression) -> Vec<PivotDimensionConfig> {
        vec![PivotDimensionConfig {
            expressions: vec![expression],
            ..Default::default()
        }]
    }

    #[test]
    fn test_attachment_positions() {
        let headers = level(&["A", "B", "C", "D"]);
        let before = PivotExpression::new("b", Add).header("B").header("C").at(ExpressionPosition::BeforeHeader);
        let after = PivotExpression::new("a", Add).header("B").header("C");
        let end = PivotExpression::new("e", Add).header("A").at(ExpressionPosition::StickToEnd);

        assert_eq!(fill_headers(&headers, &config(before), 0)[1].expressions.len(), 1);
        assert_eq!(fill_headers(&headers, &config(after), 0)[2].expressions.len(), 1);
        assert_eq!(fill_headers(&headers, &config(end), 0)[3].expressions.len(), 1);
    }

    #[test]
    fn test_unmatched_expression_is_dropped() {
        let headers = level(&["A", "B"]);
        let result = fill_headers(&headers, &config(PivotExpression::new("z", Add).header("^Z$")), 0);
        assert!(result.iter().all(|h| h.expressions.is_empty()));
    }

    #[test]
    fn test_invalid_pattern_falls_back_to_substring() {
        assert!(matches!(compile_pattern("a("), Err(PivotError::InvalidPattern { .. })));
        let headers = level(&["x", "a(1)", "b"]);
        let (resolved, matched) = extend_expression(&PivotExpression::new("t", Add).header("a("), &headers);
        assert_eq!(matched, vec![1]);
        assert!(matches!(&resolved.operands[0], HeaderOperand::Header { headers, .. } if headers.len() == 1));
    }

    #[test]
    fn test_nested_operands_resolve_against_same_level() {
        let headers = level(&["A", "B", "C"]);
        let expression = PivotExpression::new("t", Subtract)
            .header("^C$")
            .nested(PivotExpression::new("inner", Add).header("^A$").header("^B$"));
        let (resolved, matched) = extend_expression(&expression, &headers);
        assert_eq!(matched, vec![0, 1, 2]);
        // C - (A + B) = 3 - (1 + 2)
        let evaluation = evaluate_expression(&resolved, &IndexResolver);
        assert_eq!(evaluation.value, 0.0);
        assert_eq!(evaluation.indexes, vec![2, 0, 1]);
    }

    #[test]
    fn test_operations() {
        let headers = level(&["A", "B", "C"]);
        let eval = |operation: ExpressionOperation, extra: f64| {
            let expression = PivotExpression::new("t", operation).header("^C$").header("^B$").value(extra);
            let (resolved, _) = extend_expression(&expression, &headers);
            evaluate_expression(&resolved, &IndexResolver).value
        };
        assert_eq!(eval(Add, 1.0), 6.0);
        assert_eq!(eval(Subtract, 1.0), 0.0);
        assert_eq!(eval(Multiply, 2.0), 12.0);
        assert_eq!(eval(Divide, 0.0), 1.5);
    }

    #[test]
    fn test_deeper_levels_are_filled() {
        let headers = vec![PivotDataHeader::group("A", level(&["a1", "a2"]))];
        let configs = vec![
            PivotDimensionConfig::default(),
            PivotDimensionConfig {
                expressions: vec![PivotExpression::new("t", Add).header("a")],
                ..Default::default()
            },
        ];
        let result = fill_headers(&headers, &configs, 0);
        assert!(result[0].expressions.is_empty());
        assert_eq!(result[0].children()[1].expressions[0].title, "t");
    }
}
