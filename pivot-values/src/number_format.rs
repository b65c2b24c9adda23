//! FILENAME: pivot-values/src/number_format.rs
//! PURPOSE: Number formatting utilities for displaying pivot values.
//! CONTEXT: Used by constraints to render aggregated numbers and percentages.

/// Format a number in general format (auto-detect best representation).
pub fn format_general(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let abs_value = value.abs();

    // Use scientific notation for very large or very small numbers
    if abs_value >= 1e15 || (abs_value < 1e-6 && abs_value > 0.0) {
        return format!("{:e}", value);
    }

    // For integers, don't show decimal point
    if value.fract() == 0.0 {
        return format!("{:.0}", value);
    }

    // For decimals, show up to 10 digits but trim trailing zeros
    trim_decimal_zeros(&format!("{:.10}", value))
}

/// Format a number with fixed decimal places and optional thousands separator.
pub fn format_decimal(value: f64, decimal_places: u8, use_thousands_separator: bool) -> String {
    let rounded = format!("{:.prec$}", value, prec = decimal_places as usize);

    if use_thousands_separator {
        add_thousands_separator(&rounded)
    } else {
        rounded
    }
}

/// Format a fraction as a percentage, rounded to at most `decimal_places`.
/// Trailing zeros are dropped: 0.5 -> "50%", 1/3 -> "33.33%".
pub fn format_percentage(value: f64, decimal_places: u8) -> String {
    let percentage = value * 100.0;
    let formatted = trim_decimal_zeros(&format!("{:.prec$}", percentage, prec = decimal_places as usize));
    if formatted == "-0" {
        return "0%".to_string();
    }
    format!("{}%", formatted)
}

/// Add thousands separators to a numeric string.
fn add_thousands_separator(s: &str) -> String {
    let mut parts = s.splitn(2, '.');
    let integer_part = parts.next().unwrap_or_default();
    let decimal_part = parts.next();

    let negative = integer_part.starts_with('-');
    let digits: String = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut result = String::new();
    let len = digits.len();

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    if negative {
        result = format!("-{}", result);
    }

    if let Some(decimal) = decimal_part {
        result.push('.');
        result.push_str(decimal);
    }

    result
}

fn trim_decimal_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}
