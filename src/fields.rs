//! Field name to fill value mapping

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Form field name -> value to write
pub type FieldValueMap = BTreeMap<String, String>;

/// Convert a decoded JSON object into fill values.
///
/// Strings are kept verbatim, numbers and booleans are rendered as text,
/// nested arrays/objects are kept as compact JSON and `null` entries are dropped.
pub fn field_values_from_json(object: Map<String, Value>) -> FieldValueMap {
    object
        .into_iter()
        .filter_map(|(name, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other @ (Value::Array(_) | Value::Object(_)) => other.to_string(),
            };
            Some((name, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_field_values_from_json() {
        let object = json!({
            "nombre": "Ana",
            "edad": 34,
            "residente": true,
            "segundo_apellido": null,
            "hijos": ["Luis"]
        });
        let Value::Object(map) = object else {
            unreachable!()
        };

        let values = field_values_from_json(map);
        assert_eq!(values.get("nombre").unwrap(), "Ana");
        assert_eq!(values.get("edad").unwrap(), "34");
        assert_eq!(values.get("residente").unwrap(), "true");
        assert_eq!(values.get("hijos").unwrap(), r#"["Luis"]"#);
        assert!(!values.contains_key("segundo_apellido"));
    }
}
