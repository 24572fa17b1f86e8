//! String value coercion
//!
//! Every value is a string. These helpers give it a numeric or boolean
//! reading where an operator or library method needs one.

use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?\s*$").expect("numeric pattern")
});

pub const TRUE: &str = "True";
pub const FALSE: &str = "False";

/// The number this text spells, if it is numeric
pub fn parse_number(text: &str) -> Option<f64> {
    if !NUMERIC.is_match(text) {
        return None;
    }
    text.trim().parse().ok()
}

/// Numeric reading; non-numeric text counts as 0
pub fn to_number(text: &str) -> f64 {
    parse_number(text).unwrap_or(0.0)
}

/// Format a number the way values are stored
pub fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub fn bool_value(b: bool) -> String {
    if b { TRUE } else { FALSE }.to_string()
}

/// Only "True" (any case) is true
pub fn is_true(text: &str) -> bool {
    text.eq_ignore_ascii_case(TRUE)
}
