//! Small readers over DSS JSON documents, plus the name matcher shared by
//! search and batch updates.

use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value};

/// String field, or `default` when missing or not a string.
pub fn text_or<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// String field, or `""`.
pub fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    text_or(value, key, "")
}

/// Boolean field, or `default`.
pub fn flag(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Array field, or an empty slice.
pub fn list<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

/// Cloned field, or `default`.
pub fn field_or(value: &Value, key: &str, default: Value) -> Value {
    value
        .get(key)
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or(default)
}

/// Cloned field, or `null`.
pub fn field(value: &Value, key: &str) -> Value {
    field_or(value, key, Value::Null)
}

/// Cloned object field, or `{}`.
pub fn object(value: &Value, key: &str) -> Value {
    field_or(value, key, json!({}))
}

/// Cloned array field, or `[]`.
pub fn array(value: &Value, key: &str) -> Value {
    field_or(value, key, json!([]))
}

/// Cloned value at a JSON pointer, or `null`.
pub fn at(value: &Value, pointer: &str) -> Value {
    value.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// String at a JSON pointer, or `default`.
pub fn text_at<'a>(value: &'a Value, pointer: &str, default: &'a str) -> &'a str {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or(default)
}

/// Number of lines, counting a trailing empty line like a split on `\n`.
pub fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

/// JSON type name of a value.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shallow-merges `updates` into `target`, turning `target` into an object
/// first if needed.
pub fn merge(target: &mut Value, updates: &Map<String, Value>) {
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(map) = target {
        for (key, value) in updates {
            map.insert(key.clone(), value.clone());
        }
    }
}

/// Returns the object at `key`, creating an empty one when missing.
///
/// A non-object `value` is replaced by an empty object first.
pub fn object_mut<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_object() {
        *value = json!({});
    }
    if !value.get(key).is_some_and(Value::is_object) {
        value[key] = json!({});
    }
    &mut value[key]
}

/// Runs `edit` on the array at `key`, creating an empty one when missing.
///
/// A non-object `value` is replaced by an empty object first, and a
/// non-array field by an empty array.
pub fn edit_array<R>(value: &mut Value, key: &str, edit: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    if !value.is_object() {
        *value = json!({});
    }
    let slot = &mut value[key];
    let mut items = match slot.take() {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    let out = edit(&mut items);
    *slot = Value::Array(items);
    out
}

/// Percentage of `part` in `total`, `0.0` for an empty total.
#[allow(clippy::cast_precision_loss)]
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Formats names as `['a', 'b']` for error messages.
pub fn quoted_list<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s.as_ref())).collect();
    format!("[{}]", quoted.join(", "))
}

/// Epoch-millisecond timestamp field, `None` when missing or zero.
pub fn millis(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64).filter(|&t| t > 0)
}

/// Seconds between two epoch-millisecond timestamps.
#[allow(clippy::cast_precision_loss)]
pub fn duration_secs(start: Option<i64>, end: Option<i64>) -> Option<f64> {
    match (start, end) {
        (Some(start), Some(end)) if end >= start => Some((end - start) as f64 / 1000.0),
        _ => None,
    }
}

/// Case-insensitive name matcher.
///
/// The pattern is used as a regex when it compiles and as a plain substring
/// otherwise.
#[derive(Debug)]
pub struct Matcher {
    regex: Option<Regex>,
    term: String,
}

impl Matcher {
    /// Builds a matcher for a user-supplied pattern.
    pub fn new(pattern: &str) -> Self {
        Self {
            regex: RegexBuilder::new(pattern).case_insensitive(true).build().ok(),
            term: pattern.to_lowercase(),
        }
    }

    /// Returns `true` if the pattern occurs anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().map_or_else(
            || text.to_lowercase().contains(&self.term),
            |regex| regex.is_match(text),
        )
    }

    /// Returns `true` if the raw term occurs as a substring of `text`.
    pub fn contains(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.term)
    }
}
