//! Conversions of property values into text.

use serde_json::Value;

/// Truthiness of a property value: `null`, `false`, zero, the empty
/// string, the empty array and the empty object are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// The text a value contributes to an interpolated string.
///
/// Strings are inserted as-is, `null` becomes the empty string and
/// everything else uses its compact JSON form.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The quoted form used by the `%r` conversion.
pub fn to_repr_string(value: &Value) -> String {
    value.to_string()
}

/// Short type name used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("0"), json!(["a"]), json!({"a": 1})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn test_display_string() {
        assert_eq!(to_display_string(&json!(null)), "");
        assert_eq!(to_display_string(&json!("a-string")), "a-string");
        assert_eq!(to_display_string(&json!(10)), "10");
        assert_eq!(to_display_string(&json!(["a", "b"])), r#"["a","b"]"#);
        assert_eq!(to_repr_string(&json!("a")), r#""a""#);
    }
}
