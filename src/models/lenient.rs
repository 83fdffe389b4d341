//! Permissive serde helpers for model-produced JSON.
//!
//! Generation backends return numbers as strings, booleans as "yes",
//! empty strings where `null` was meant, and free-form level names. These
//! helpers coerce what can be coerced and fail only when the value is
//! unusable, so a schema violation is reserved for genuinely bad output.

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

use super::enums::CognitiveLevel;

/// Integer from a number or numeric string. Floats with no fractional part are accepted.
pub fn deserialize_flexible_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    value_as_i64(&raw)
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a small non-negative integer, got {raw}")))
}

/// Optional integer. `null`, `""` and unparseable strings become `None`.
pub fn deserialize_optional_u32_flexible<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(value_as_i64)
        .and_then(|n| u32::try_from(n).ok()))
}

/// Optional string. Empty or whitespace-only strings become `None`; numbers are stringified.
pub fn deserialize_optional_nonempty_string<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// String that tolerates `null` and numbers.
pub fn deserialize_string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

/// Truthy coercion: `true`, non-zero numbers, and "true"/"yes"/"1".
pub fn deserialize_truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "1" | "evet"
        ),
        _ => false,
    })
}

/// Free-form level text through [`CognitiveLevel::from_lenient`].
pub fn deserialize_optional_level<'de, D>(
    deserializer: D,
) -> Result<Option<CognitiveLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => CognitiveLevel::from_lenient(&s),
        _ => None,
    })
}

/// A list of strings. A single string becomes a one-element list; `null` becomes empty.
pub fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Number from a JSON number or numeric string.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
