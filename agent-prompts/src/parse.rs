//! Extraction of structured values from free-form model output.
//!
//! Models wrap JSON in prose, fenced blocks, or both. Extraction prefers a
//! fenced block tagged `json`, then any fenced block that parses, then the
//! first balanced `{...}` or `[...]` span in the text.

use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons a structured value could not be extracted.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The text contained no JSON object or array.
    #[error("no structured value found in model output")]
    NotFound,
    /// A candidate span was found but is not valid JSON.
    #[error("invalid JSON in model output: {source}")]
    InvalidJson {
        /// Underlying decoder error.
        #[from]
        source: serde_json::Error,
    },
    /// Valid JSON of the wrong shape.
    #[error("unexpected shape: expected {expected}")]
    UnexpectedShape {
        /// Description of the expected shape.
        expected: &'static str,
    },
}

/// Extracts the first JSON object or array from `text`.
///
/// # Errors
///
/// Returns [`ParseError::NotFound`] when no candidate exists, or
/// [`ParseError::InvalidJson`] when the best candidate does not decode.
pub fn extract_json(text: &str) -> Result<Value, ParseError> {
    if let Some(block) = fenced_block(text, Some("json")) {
        return Ok(serde_json::from_str(block)?);
    }
    if let Some(value) = fenced_block(text, None)
        .and_then(|block| serde_json::from_str::<Value>(block).ok())
        .filter(|value| value.is_object() || value.is_array())
    {
        return Ok(value);
    }
    let span = balanced_span(text).ok_or(ParseError::NotFound)?;
    Ok(serde_json::from_str(span)?)
}

/// Extracts a JSON object.
///
/// # Errors
///
/// Fails like [`extract_json`], or with [`ParseError::UnexpectedShape`] when
/// the value is not an object.
pub fn extract_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    match extract_json(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::UnexpectedShape { expected: "object" }),
    }
}

/// Extracts an array whose entries are all objects.
///
/// # Errors
///
/// Fails like [`extract_json`], or with [`ParseError::UnexpectedShape`] when
/// the value is not an array of objects.
pub fn extract_object_array(text: &str) -> Result<Vec<Map<String, Value>>, ParseError> {
    let Value::Array(items) = extract_json(text)? else {
        return Err(ParseError::UnexpectedShape { expected: "array" });
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(ParseError::UnexpectedShape {
                expected: "array of objects",
            }),
        })
        .collect()
}

/// Extracts an array of strings, trimming each entry and dropping blanks.
///
/// # Errors
///
/// Fails like [`extract_json`], or with [`ParseError::UnexpectedShape`] when
/// the value is not an array of strings.
pub fn extract_string_array(text: &str) -> Result<Vec<String>, ParseError> {
    let Value::Array(items) = extract_json(text)? else {
        return Err(ParseError::UnexpectedShape { expected: "array" });
    };
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        let Value::String(name) = item else {
            return Err(ParseError::UnexpectedShape {
                expected: "array of strings",
            });
        };
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            names.push(trimmed.to_owned());
        }
    }
    Ok(names)
}

fn fenced_block<'a>(text: &'a str, tag: Option<&str>) -> Option<&'a str> {
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let line_end = after.find('\n')?;
        let info = after[..line_end].trim();
        let body = &after[line_end + 1..];
        let end = body.find("```")?;
        let matches = match tag {
            Some(tag) => info.eq_ignore_ascii_case(tag),
            None => true,
        };
        if matches {
            return Some(body[..end].trim());
        }
        rest = &body[end + 3..];
    }
    None
}

/// Returns the first balanced `{...}` or `[...]` span, honouring string literals.
fn balanced_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prefers_json_fenced_block() {
        let text = "Sure! {\"ignored\": true}\n```json\n{\"user\": \"Ada\", \"content\": \"hi\"}\n```";
        let map = extract_object(text).unwrap();
        assert_eq!(map.get("user"), Some(&json!("Ada")));
    }

    #[test]
    fn falls_back_to_untagged_block_then_span() {
        let untagged = "```\n[\"a\", \"b\"]\n```";
        assert_eq!(extract_string_array(untagged).unwrap(), ["a", "b"]);

        let prose = "Here you go: {\"action\": \"NONE\", \"note\": \"a } in text\"} trailing";
        let map = extract_object(prose).unwrap();
        assert_eq!(map.get("action"), Some(&json!("NONE")));
    }

    #[test]
    fn rejects_text_without_structure() {
        assert!(matches!(
            extract_json("I cannot help with that."),
            Err(ParseError::NotFound)
        ));
        assert!(matches!(
            extract_json("{not json}"),
            Err(ParseError::InvalidJson { .. })
        ));
    }

    #[test]
    fn shape_checks() {
        assert!(matches!(
            extract_object("[1, 2]"),
            Err(ParseError::UnexpectedShape { .. })
        ));
        assert!(matches!(
            extract_object_array("[{\"claim\": \"x\"}, 3]"),
            Err(ParseError::UnexpectedShape { .. })
        ));
        let items = extract_object_array("[{\"claim\": \"x\", \"type\": \"fact\"}]").unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn string_arrays_drop_blanks() {
        let names = extract_string_array("[\" FACTS \", \"\", \"GOALS\"]").unwrap();
        assert_eq!(names, ["FACTS", "GOALS"]);
    }
}
