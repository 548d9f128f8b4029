//! Canonical form of the per-request options mapping.
//!
//! Two option sets with the same key/value pairs must land on the same cache
//! key no matter how they were built, so objects are serialized with their
//! keys sorted at every nesting level.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DispatchError;

/// The options mapping handed to adapters
pub type Params = Map<String, Value>;

/// Canonical string used when params are absent (same as an empty mapping)
pub const EMPTY_PARAMS_KEY: &str = "{}";

/// Canonicalize an optional JSON options value into a stable cache-key string.
///
/// `None`, `null` and `{}` all canonicalize to `"{}"`. Any top-level value
/// other than an object is rejected with [`DispatchError::InvalidParams`].
pub fn canonicalize(params: Option<&Value>) -> Result<String, DispatchError> {
    match params {
        None | Some(Value::Null) => Ok(EMPTY_PARAMS_KEY.to_string()),
        Some(Value::Object(map)) => {
            let mut out = String::new();
            write_object(map, &mut out)?;
            Ok(out)
        }
        Some(other) => Err(DispatchError::invalid_params(format!(
            "params must be a JSON object, got {}",
            kind_of(other)
        ))),
    }
}

/// Canonicalize any serializable options value.
///
/// Serializer failures (for example a map keyed by something other than
/// strings) are reported as [`DispatchError::InvalidParams`].
pub fn canonicalize_serialize<P>(params: Option<&P>) -> Result<String, DispatchError>
where
    P: Serialize + ?Sized,
{
    match params {
        None => Ok(EMPTY_PARAMS_KEY.to_string()),
        Some(p) => {
            let value = serde_json::to_value(p)
                .map_err(|e| DispatchError::invalid_params(e.to_string()))?;
            canonicalize(Some(&value))
        }
    }
}

/// Convert an optional JSON value into the mapping passed to adapters
pub fn to_params(params: Option<&Value>) -> Result<Params, DispatchError> {
    match params {
        None | Some(Value::Null) => Ok(Params::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(DispatchError::invalid_params(format!(
            "params must be a JSON object, got {}",
            kind_of(other)
        ))),
    }
}

fn write_value(value: &Value, out: &mut String) -> Result<(), DispatchError> {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
            Ok(())
        }
        scalar => {
            let encoded = serde_json::to_string(scalar)
                .map_err(|e| DispatchError::invalid_params(e.to_string()))?;
            out.push_str(&encoded);
            Ok(())
        }
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) -> Result<(), DispatchError> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let encoded_key = serde_json::to_string(key)
            .map_err(|e| DispatchError::invalid_params(e.to_string()))?;
        out.push_str(&encoded_key);
        out.push(':');
        write_value(value, out)?;
    }
    out.push('}');
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"a": 1, "b": 2});
        let mut map = Map::new();
        map.insert("b".to_string(), json!(2));
        map.insert("a".to_string(), json!(1));
        let b = Value::Object(map);

        assert_eq!(canonicalize(Some(&a)).unwrap(), canonicalize(Some(&b)).unwrap());
        assert_eq!(canonicalize(Some(&a)).unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_absent_matches_empty() {
        assert_eq!(canonicalize(None).unwrap(), EMPTY_PARAMS_KEY);
        assert_eq!(canonicalize(Some(&Value::Null)).unwrap(), EMPTY_PARAMS_KEY);
        assert_eq!(canonicalize(Some(&json!({}))).unwrap(), EMPTY_PARAMS_KEY);
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let a = json!({"gen": {"top_p": 0.9, "max_length": 64}, "lang": "ko"});
        let b = json!({"lang": "ko", "gen": {"max_length": 64, "top_p": 0.9}});

        let key = canonicalize(Some(&a)).unwrap();
        assert_eq!(key, canonicalize(Some(&b)).unwrap());
        assert_eq!(key, r#"{"gen":{"max_length":64,"top_p":0.9},"lang":"ko"}"#);
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = json!({"stop": ["a", "b"]});
        let b = json!({"stop": ["b", "a"]});
        assert_ne!(canonicalize(Some(&a)).unwrap(), canonicalize(Some(&b)).unwrap());
    }

    #[test]
    fn test_non_ascii_kept_verbatim() {
        let key = canonicalize(Some(&json!({"prefix": "안녕"}))).unwrap();
        assert_eq!(key, r#"{"prefix":"안녕"}"#);
    }

    #[test]
    fn test_non_object_rejected() {
        let err = canonicalize(Some(&json!([1, 2]))).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));

        let err = canonicalize(Some(&json!("max_length=64"))).unwrap_err();
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn test_serialize_variant() {
        let mut options = HashMap::new();
        options.insert("min_length", 20);
        options.insert("max_length", 64);

        let key = canonicalize_serialize(Some(&options)).unwrap();
        assert_eq!(key, r#"{"max_length":64,"min_length":20}"#);
        assert_eq!(canonicalize_serialize::<Value>(None).unwrap(), EMPTY_PARAMS_KEY);
    }

    #[test]
    fn test_serialize_failure_is_invalid_params() {
        let mut options: HashMap<(u8, u8), u8> = HashMap::new();
        options.insert((1, 2), 3);

        let err = canonicalize_serialize(Some(&options)).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
    }

    #[test]
    fn test_to_params() {
        assert!(to_params(None).unwrap().is_empty());
        let params = to_params(Some(&json!({"max_length": 64}))).unwrap();
        assert_eq!(params.get("max_length"), Some(&json!(64)));
        assert!(to_params(Some(&json!(3))).is_err());
    }
}
