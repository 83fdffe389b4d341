//! Permissive extraction of a JSON value from free-form model output.
//!
//! Order of operations:
//! 1. drop the first `<think>...</think>` block
//! 2. prefer the inner text of the first fenced code block
//! 3. cut from the first opening bracket of the requested shape to the
//!    last closing one (or to the end when the closer is missing)
//! 4. double every backslash that does not start a valid JSON escape
//!    (`\beta`, `\frac` survive as literal text)
//! 5. strict parse, then a bounded set of closer suffixes for truncated output
//!
//! Pure: no I/O, no logging, never panics.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use super::sanitize::strip_reasoning_block;

/// Expected top-level JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Object,
    Array,
}

impl JsonShape {
    fn brackets(self) -> (char, char) {
        match self {
            Self::Object => ('{', '}'),
            Self::Array => ('[', ']'),
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Suffixes tried, in order, when the candidate text does not parse.
const CLOSERS: &[&str] = &["}", "]", "\"}", "\"]", "]}", "}}"];
/// Additional suffix for truncated arrays of objects.
const ARRAY_CLOSER: &str = "}]";

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("valid regex"));

static BACKSLASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\\["\\/nrt]|\\u[0-9a-fA-F]{4})|(\\)"#).expect("valid regex")
});

/// Extract a value of the requested shape from raw model text.
///
/// Returns `None` when the input is absent, holds no bracketed span of the
/// requested shape, or cannot be repaired into valid JSON.
pub fn extract_structured(raw: Option<&str>, shape: JsonShape) -> Option<Value> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }

    let without_reasoning = strip_reasoning_block(raw.trim());
    let text = without_reasoning.trim();

    let text = match FENCE_RE.captures(text) {
        Some(caps) => caps.get(1).map_or(text, |m| m.as_str().trim()),
        None => text,
    };

    let span = bracket_span(text, shape)?;
    let repaired = repair_escapes(span);

    parse_with_recovery(&repaired, shape)
}

/// Slice from the first opening bracket to the last closing bracket.
/// Keeps the tail when the closer is missing so truncation recovery can run.
fn bracket_span(text: &str, shape: JsonShape) -> Option<&str> {
    let (open, close) = shape.brackets();
    let start = text.find(open)?;
    match text.rfind(close) {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Keep valid JSON escapes and double every other backslash.
pub fn repair_escapes(text: &str) -> String {
    BACKSLASH_RE
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            Some(valid) => valid.as_str().to_string(),
            None => "\\\\".to_string(),
        })
        .into_owned()
}

fn parse_with_recovery(text: &str, shape: JsonShape) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return shape.matches(&value).then_some(value);
    }

    let extra: &[&str] = match shape {
        JsonShape::Array => &[ARRAY_CLOSER],
        JsonShape::Object => &[],
    };

    CLOSERS
        .iter()
        .chain(extra.iter())
        .filter_map(|closer| serde_json::from_str::<Value>(&format!("{text}{closer}")).ok())
        .find(|value| shape.matches(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(raw: &str) -> Option<Value> {
        extract_structured(Some(raw), JsonShape::Object)
    }

    #[test]
    fn clean_object_round_trips() {
        let value = json!({"title": "Entropy", "items": [1, 2, 3], "nested": {"ok": true}});
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(object(&text), Some(value));
    }

    #[test]
    fn fenced_json_block() {
        assert_eq!(object("```json\n{\"a\":1}\n```"), Some(json!({"a": 1})));
    }

    #[test]
    fn bare_fence_without_language() {
        assert_eq!(object("Here you go:\n```\n{\"a\":2}\n```\nThanks"), Some(json!({"a": 2})));
    }

    #[test]
    fn prose_around_object() {
        assert_eq!(
            object("Sure! The answer is {\"a\": 1, \"b\": 2}. Let me know."),
            Some(json!({"a": 1, "b": 2}))
        );
    }

    #[test]
    fn missing_closer_is_recovered() {
        assert_eq!(object("{\"a\":1,\"b\":2"), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn truncated_string_value_is_recovered() {
        assert_eq!(object("{\"a\":\"unfinished"), Some(json!({"a": "unfinished"})));
    }

    #[test]
    fn latex_backslashes_survive() {
        let value = object(r#"{"formula": "\beta = \frac{1}{2}"}"#).unwrap();
        assert_eq!(value["formula"], r"\beta = \frac{1}{2}");
    }

    #[test]
    fn valid_escapes_are_kept() {
        let value = object(r#"{"text": "line\nnext \"quoted\" é a\\b"}"#).unwrap();
        assert_eq!(value["text"], "line\nnext \"quoted\" \u{e9} a\\b");
    }

    #[test]
    fn unicode_escapes_survive_repair() {
        assert_eq!(repair_escapes(r"\u00b0C \frac"), r"\u00b0C \\frac");
        let value = object(r#"{"unit": "\u00b0C", "note": "\user \u12"}"#).unwrap();
        assert_eq!(value["unit"], "\u{b0}C");
        assert_eq!(value["note"], r"\user \u12");
    }

    #[test]
    fn reasoning_block_is_ignored() {
        let raw = "<think>Maybe {\"wrong\": true}</think>{\"right\": true}";
        assert_eq!(object(raw), Some(json!({"right": true})));
    }

    #[test]
    fn array_mode_extracts_array() {
        let raw = "Concepts: [{\"title\":\"A\"},{\"title\":\"B\"}] done";
        let value = extract_structured(Some(raw), JsonShape::Array).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn truncated_array_of_objects_is_recovered() {
        let value = extract_structured(Some("[{\"a\":1},{\"b\":2"), JsonShape::Array).unwrap();
        assert_eq!(value, json!([{"a": 1}, {"b": 2}]));
    }

    #[test]
    fn shape_mismatch_is_none() {
        assert!(extract_structured(Some("[1,2,3]"), JsonShape::Object).is_none());
    }

    #[test]
    fn no_brackets_is_none() {
        assert!(object("I cannot help with that.").is_none());
    }

    #[test]
    fn empty_and_absent_input_is_none() {
        assert!(extract_structured(None, JsonShape::Object).is_none());
        assert!(object("   ").is_none());
    }

    #[test]
    fn unrecoverable_garbage_is_none() {
        assert!(object("{\"a\": [1, 2, {\"b\": ").is_none());
    }
}
