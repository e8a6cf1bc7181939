//! Model output cleanup: raw text -> JSON span -> normalized text -> field values

use crate::error::{Error, Result};
use crate::fields::{field_values_from_json, FieldValueMap};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// First `{` to last `}` across the whole response, newlines included.
static GREEDY_OBJECT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(\{.*\})").unwrap());

/// How the JSON object is located inside free-form model output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonExtraction {
    /// First brace-balanced object; braces inside quoted strings are ignored
    #[default]
    Balanced,
    /// Legacy behaviour: everything from the first `{` to the last `}`.
    /// Two separate objects (or stray braces in surrounding prose) yield a
    /// span that is not valid JSON.
    Greedy,
}

impl std::str::FromStr for JsonExtraction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "greedy" | "legacy" => Ok(Self::Greedy),
            other => Err(Error::InvalidConfig {
                reason: format!("unknown JSON_EXTRACTION '{}'", other),
            }),
        }
    }
}

/// Locate the JSON object span in a raw model response.
pub fn extract_json_span(response: &str, mode: JsonExtraction) -> Result<&str> {
    let span = match mode {
        JsonExtraction::Greedy => GREEDY_OBJECT_PATTERN
            .captures(response)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str()),
        JsonExtraction::Balanced => balanced_object(response),
    };
    span.map(str::trim).ok_or(Error::JsonNotFound)
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    // Closing delimiter of the string being scanned, if any
    let mut closing: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(close) = closing {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == close => closing = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' => closing = Some(c),
            '\u{201C}' => closing = Some('\u{201D}'),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Heuristic repair for near-JSON: curly quotes and single quotes become
/// straight double quotes and every backslash is removed. Values that
/// legitimately contain an apostrophe or a backslash are altered.
pub fn normalize_json_text(span: &str) -> String {
    span.replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\'', "\"")
        .replace('\\', "")
}

/// Decode the normalized span into field values.
pub fn parse_field_values(json_text: &str) -> Result<FieldValueMap> {
    let value: Value = serde_json::from_str(json_text).map_err(|e| {
        tracing::error!(error = %e, "JSON decoding failed");
        Error::MalformedJson {
            reason: e.to_string(),
        }
    })?;

    let Value::Object(object) = value else {
        return Err(Error::MalformedJson {
            reason: "expected a JSON object".to_string(),
        });
    };

    if object.is_empty() {
        return Err(Error::EmptyJson);
    }

    Ok(field_values_from_json(object))
}

/// Full cleanup of one raw response.
pub fn clean_response(response: &str, mode: JsonExtraction) -> Result<FieldValueMap> {
    if response.trim().is_empty() {
        return Err(Error::EmptyModelResponse);
    }

    let span = extract_json_span(response, mode)?;
    let normalized = normalize_json_text(span);
    tracing::debug!(chars = normalized.len(), "Extracted JSON span");

    parse_field_values(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(JsonExtraction::Greedy)]
    #[case(JsonExtraction::Balanced)]
    fn test_extract_from_surrounding_prose(#[case] mode: JsonExtraction) {
        let raw = "Here is the result:\n{\"a\": \"1\"}\nThanks";
        assert_eq!(extract_json_span(raw, mode).unwrap(), "{\"a\": \"1\"}");
    }

    #[test]
    fn test_greedy_spans_two_objects() {
        let raw = r#"{"a":"1"} and {"b":"2"}"#;
        assert_eq!(
            extract_json_span(raw, JsonExtraction::Greedy).unwrap(),
            r#"{"a":"1"} and {"b":"2"}"#
        );
        assert!(matches!(
            clean_response(raw, JsonExtraction::Greedy),
            Err(Error::MalformedJson { .. })
        ));
    }

    #[test]
    fn test_balanced_takes_first_object() {
        let raw = r#"{"a":"1"} and {"b":"2"}"#;
        assert_eq!(
            extract_json_span(raw, JsonExtraction::Balanced).unwrap(),
            r#"{"a":"1"}"#
        );
    }

    #[test]
    fn test_balanced_handles_nesting_and_braces_in_strings() {
        let raw = "Result: {\"dir\": {\"calle\": \"Mayor {3}\"}, \"q\": \"a\\\"}\"} done }";
        assert_eq!(
            extract_json_span(raw, JsonExtraction::Balanced).unwrap(),
            "{\"dir\": {\"calle\": \"Mayor {3}\"}, \"q\": \"a\\\"}\"}"
        );
    }

    #[test]
    fn test_balanced_single_quoted_value_with_brace() {
        let raw = "{'domicilio': 'Calle Mayor 3 }', 'dni': '12345678Z'}";
        assert_eq!(extract_json_span(raw, JsonExtraction::Balanced).unwrap(), raw);

        let values = clean_response(raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(values["domicilio"], "Calle Mayor 3 }");
        assert_eq!(values["dni"], "12345678Z");
    }

    #[test]
    fn test_balanced_curly_quoted_value_with_brace() {
        let raw = "Aquí: {\u{201C}nombre\u{201D}: \u{201C}ANA {}\u{201D}} fin }";
        assert_eq!(
            extract_json_span(raw, JsonExtraction::Balanced).unwrap(),
            "{\u{201C}nombre\u{201D}: \u{201C}ANA {}\u{201D}}"
        );
    }

    #[rstest]
    #[case(JsonExtraction::Greedy)]
    #[case(JsonExtraction::Balanced)]
    fn test_no_object_found(#[case] mode: JsonExtraction) {
        assert!(matches!(
            extract_json_span("no json here", mode),
            Err(Error::JsonNotFound)
        ));
    }

    #[test]
    fn test_balanced_unterminated_object() {
        assert!(matches!(
            extract_json_span("{\"a\": \"1\"", JsonExtraction::Balanced),
            Err(Error::JsonNotFound)
        ));
    }

    #[test]
    fn test_normalize_quotes_and_escapes() {
        assert_eq!(
            normalize_json_text("{\u{201C}nombre\u{201D}: 'Ana', \"x\": \"a\\\\b\"}"),
            "{\"nombre\": \"Ana\", \"x\": \"ab\"}"
        );
    }

    #[test]
    fn test_normalize_corrupts_apostrophes() {
        // Known limitation of the heuristic
        let normalized = normalize_json_text(r#"{"apellido": "O'Neill"}"#);
        assert_eq!(normalized, r#"{"apellido": "O"Neill"}"#);
        assert!(parse_field_values(&normalized).is_err());
    }

    #[test]
    fn test_parse_rejects_empty_object() {
        assert!(matches!(parse_field_values("{}"), Err(Error::EmptyJson)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            parse_field_values("{\"a\": }"),
            Err(Error::MalformedJson { .. })
        ));
    }

    #[test]
    fn test_clean_response_empty_is_checked_first() {
        assert!(matches!(
            clean_response("", JsonExtraction::Balanced),
            Err(Error::EmptyModelResponse)
        ));
        assert!(matches!(
            clean_response("  \n ", JsonExtraction::Greedy),
            Err(Error::EmptyModelResponse)
        ));
    }

    #[test]
    fn test_clean_response_single_quoted_model_output() {
        let raw = "Claro, aquí tienes:\n{'nombre': 'ANA', 'dni': '12345678Z'}";
        let values = clean_response(raw, JsonExtraction::Balanced).unwrap();
        assert_eq!(values.get("nombre").unwrap(), "ANA");
        assert_eq!(values.get("dni").unwrap(), "12345678Z");
    }
}
