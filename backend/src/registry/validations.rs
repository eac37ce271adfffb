//! Built-in validation rules and error-code derivation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid regex"));
static LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));

/// `notNull`: the field is present and not JSON `null`.
pub fn not_null(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !v.is_null())
}

/// `notEmpty`: the field is present and holds something once trimmed.
pub fn not_empty(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !is_empty(v))
}

/// Check if a value is "empty" (null, blank string, empty array/object).
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Machine-readable code for a rule name: camelCase → UPPER_SNAKE_CASE.
///
/// `notEmpty` → `NOT_EMPTY`, `isHTTPUrl` → `IS_HTTP_URL`.
pub fn error_code(rule_name: &str) -> String {
    let spaced = WORD_BOUNDARY.replace_all(rule_name, "${1}_${2}");
    LOWER_UPPER
        .replace_all(&spaced, "${1}_${2}")
        .to_uppercase()
}

/// Message used when a rule was registered without one.
pub fn default_message(rule_name: &str) -> String {
    format!("Validation '{}' failed", rule_name)
}
