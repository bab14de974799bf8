use serde_json::Value;

/// Returned for a success body whose shape we do not recognize
pub const UNEXPECTED_FORMAT: &str = "Received an unexpected response format from the API.";

/// Returned when the backend produced a candidate part without text
pub const EMPTY_CONTENT: &str = "No content in response";

/// Map a successful backend response body to the canonical result string.
///
/// Looks for `candidates[0].content.parts[0].text` first, then a flat
/// `text` field. Anything else, including a non-JSON body, yields
/// [`UNEXPECTED_FORMAT`]. This never fails.
pub fn normalize(body: &[u8]) -> String {
    let data: Value = match serde_json::from_slice(body) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Success response was not JSON: {}", e);
            return UNEXPECTED_FORMAT.to_string();
        }
    };

    let part = &data["candidates"][0]["content"]["parts"][0];
    if !part.is_null() {
        return match part["text"].as_str() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => EMPTY_CONTENT.to_string(),
        };
    }

    match data["text"].as_str() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => {
            tracing::warn!("Unexpected response format: {}", data);
            UNEXPECTED_FORMAT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_nested_candidate_text() {
        let data = body(json!({
            "candidates": [{"content": {"parts": [{"text": "# A cat\nOn a mat."}], "role": "model"}}]
        }));
        assert_eq!(normalize(&data), "# A cat\nOn a mat.");
    }

    #[test]
    fn test_only_first_candidate_and_part_are_used() {
        let data = body(json!({
            "candidates": [
                {"content": {"parts": [{"text": "first"}, {"text": "second"}]}},
                {"content": {"parts": [{"text": "other"}]}}
            ]
        }));
        assert_eq!(normalize(&data), "first");
    }

    #[test]
    fn test_flat_text_fallback() {
        assert_eq!(normalize(&body(json!({"text": "flat answer"}))), "flat answer");
    }

    #[test]
    fn test_empty_part_text() {
        let data = body(json!({"candidates": [{"content": {"parts": [{"text": ""}]}}]}));
        assert_eq!(normalize(&data), EMPTY_CONTENT);
    }

    #[test]
    fn test_unrecognized_shapes() {
        assert_eq!(normalize(&body(json!({"result": "x"}))), UNEXPECTED_FORMAT);
        assert_eq!(normalize(&body(json!({"candidates": []}))), UNEXPECTED_FORMAT);
        assert_eq!(normalize(&body(json!({"candidates": "nope"}))), UNEXPECTED_FORMAT);
        assert_eq!(normalize(&body(json!([1, 2, 3]))), UNEXPECTED_FORMAT);
        assert_eq!(normalize(b"not json at all"), UNEXPECTED_FORMAT);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let data = body(json!({"candidates": [{"content": {"parts": [{"text": "same"}]}}]}));
        assert_eq!(normalize(&data), normalize(&data));
    }
}
