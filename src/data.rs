use std::fmt;

use serde::{Deserialize, Serialize};

/// Markers `to_float` reads as zero, compared case-insensitively.
const NUMERIC_MISSING_MARKERS: &[&str] = &["nan", "<na>", "none", "null"];

/// Exact spellings `present_text` treats as an absent value.
const TEXT_MISSING_MARKERS: &[&str] = &["nan", "<NA>", "None"];

/// A single table cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form used for comparisons and rendering. `Null` renders empty.
    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Locale tolerant numeric view of the cell; never fails.
    pub fn to_float(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Number(n) => *n,
            Value::Text(s) => to_float(s),
        }
    }

    /// Trimmed text of the cell unless it is null, blank or a missing marker.
    pub fn present_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        let display = self.as_display();
        let trimmed = display.trim();
        if trimmed.is_empty() || TEXT_MISSING_MARKERS.contains(&trimmed) {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

fn is_numeric_missing_marker(value: &str) -> bool {
    NUMERIC_MISSING_MARKERS
        .iter()
        .any(|marker| value.eq_ignore_ascii_case(marker))
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Converts Turkish (`1.234,56`) and plain (`1234.56`) numeric literals to
/// `f64`. Blank, missing markers and unparseable input all yield `0.0`.
///
/// ```
/// use cost_reconcile::data::to_float;
///
/// assert_eq!(to_float("1.234,56"), 1234.56);
/// assert_eq!(to_float("1,234.56"), 1234.56);
/// assert_eq!(to_float("12,5"), 12.5);
/// assert_eq!(to_float("n/a"), 0.0);
/// ```
pub fn to_float(raw: &str) -> f64 {
    let compact = raw
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>();
    if compact.is_empty() || is_numeric_missing_marker(&compact) {
        return 0.0;
    }
    let literal = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        _ => compact,
    };
    literal.parse::<f64>().unwrap_or(0.0)
}
