use serde::de::DeserializeOwned;
use serde_json::Value;

use super::parser::JsonShape;

/// A type the structured generator can produce.
///
/// Deserialization handles coercion; `schema_issues` enforces the rules
/// serde cannot express (lengths, ranges, non-empty fields).
pub trait StructuredSchema: DeserializeOwned + Send {
    /// Top-level JSON shape the backend is asked to return.
    const SHAPE: JsonShape = JsonShape::Object;

    /// Structural problems with a deserialized value. Empty means valid.
    fn schema_issues(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Deserialize and check a candidate value. `Err` carries a readable issue list.
pub fn conform<T: StructuredSchema>(value: Value) -> Result<T, String> {
    let typed: T = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let issues = typed.schema_issues();
    if issues.is_empty() {
        Ok(typed)
    } else {
        Err(issues.join("; "))
    }
}
