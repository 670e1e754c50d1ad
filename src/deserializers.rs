//! Forgiving numeric deserializers for request bodies and configuration tables.
//!
//! Front-ends send numbers as JSON numbers or as numeric strings (`"2500"`);
//! both are accepted. Non-finite values are rejected.

use serde::{Deserialize, Deserializer};

/// Interpret a JSON value as a finite `f64`.
///
/// # Accepted Formats
///
/// * **Number**: `2500`, `75.5`
/// * **String numeric**: `"2500"`, `" 75.5 "`
pub fn f64_from_value(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Deserializes an optional numeric field; `null` or absent becomes `None`.
///
/// # Errors
///
/// Returns an error if the value is present but is not a finite number or numeric string.
pub fn de_option_f64_forgiving<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(v) = opt else { return Ok(None) };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(ref s) if s.trim().is_empty() => Ok(None),
        other => f64_from_value(&other)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected a number, got {}", other))),
    }
}
