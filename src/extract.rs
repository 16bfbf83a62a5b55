//! Recovery of a JSON object embedded in free-form model output

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError
{   #[error("No matching closing brace found in JSON")]
    NoMatchingBrace
  , #[error("{0}")]
    InvalidJson(#[from] serde_json::Error)
  , #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str)
}

/// Locate the JSON candidate inside `text`.
///
/// Starts at the first `{` and counts brace depth until it returns to
/// zero; the span is inclusive. Without any `{` the whole text is the
/// candidate. Braces inside string literals are counted like any other,
/// so a value such as `"a}"` will end the span early.
pub fn extract_json_candidate(text: &str) -> Result<&str, ExtractionError>
{   let Some(start) = text.find('{')
    else
    {   return Ok(text);
    };

    let mut depth: usize = 0;
    for (offset, ch) in text[start..].char_indices()
    {   match ch
        {   '{' => depth += 1
          , '}' =>
            {   depth -= 1;
                if depth == 0
                {   let end = start + offset + ch.len_utf8();
                    return Ok(&text[start..end]);
                }
            }
          , _ => {}
        }
    }
    Err(ExtractionError::NoMatchingBrace)
}

/// Extract the candidate and parse it as a JSON object
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, ExtractionError>
{   let candidate = extract_json_candidate(text)?;
    match serde_json::from_str::<Value>(candidate)?
    {   Value::Object(map) => Ok(map)
      , other => Err(ExtractionError::NotAnObject(json_type_name(&other)))
    }
}

/// Number of leaf fields in a (possibly nested) template object
pub fn count_fields(fields: &Map<String, Value>) -> usize
{   fields.values()
      .map(|v| match v
      {   Value::Object(inner) => count_fields(inner)
        , _ => 1
      })
      .sum()
}

fn json_type_name(value: &Value) -> &'static str
{   match value
    {   Value::Null => "null"
      , Value::Bool(_) => "a boolean"
      , Value::Number(_) => "a number"
      , Value::String(_) => "a string"
      , Value::Array(_) => "an array"
      , Value::Object(_) => "an object"
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn strips_commentary_around_the_object()
    {   let text = "Sure! {\"a\": 1, \"b\": {\"c\": 2}} Hope that helps.";
        assert_eq!(
          extract_json_candidate(text).unwrap(),
          "{\"a\": 1, \"b\": {\"c\": 2}}"
        );
        let map = parse_json_object(text).unwrap();
        assert_eq!(Value::Object(map), json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn stops_at_the_first_balanced_object()
    {   let text = "{\"x\": 1} and also {\"y\": 2}";
        assert_eq!(extract_json_candidate(text).unwrap(), "{\"x\": 1}");
    }

    #[test]
    fn truncated_output_reports_missing_brace()
    {   let err = extract_json_candidate("{\"a\": 1").unwrap_err();
        assert!(matches!(err, ExtractionError::NoMatchingBrace));
        assert!(err.to_string().contains("No matching closing brace"));
    }

    #[test]
    fn text_without_braces_is_parsed_whole()
    {   assert_eq!(extract_json_candidate("  [1, 2] ").unwrap(), "  [1, 2] ");
        let err = parse_json_object("[1, 2]").unwrap_err();
        assert!(matches!(err, ExtractionError::NotAnObject("an array")));
        let err = parse_json_object("no json here").unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidJson(_)));
    }

    #[test]
    fn brace_inside_string_cuts_span_short()
    {   // naive scan: the '}' in the value closes the object early
        let text = "{\"a\": \"}\", \"b\": 1}";
        assert_eq!(extract_json_candidate(text).unwrap(), "{\"a\": \"}");
        assert!(parse_json_object(text).is_err());
    }

    #[test]
    fn handles_multibyte_text_before_the_object()
    {   let text = "Température élevée → {\"t\": \"38.6°C\"}";
        let map = parse_json_object(text).unwrap();
        assert_eq!(map["t"], json!("38.6°C"));
    }

    #[test]
    fn counts_nested_leaves()
    {   let fields = json!({
          "chief_complaint": "",
          "exam": {"vitals": {"bp": "", "hr": ""}, "general": ""},
          "plan": ""
        });
        let Value::Object(map) = fields else { unreachable!() };
        assert_eq!(count_fields(&map), 5);
    }
}
