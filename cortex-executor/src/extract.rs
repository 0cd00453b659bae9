//! Helpers for digesting model output: fence stripping and output shaping.

use cortex_contract::LoadedContract;
use serde_json::{json, Value};

/// Strip a single wrapping Markdown code fence (``` or ```json) from the
/// text, if present. Anything else passes through untouched.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string (e.g. "json") up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed.to_string(),
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim().to_string(),
        None => body.trim().to_string(),
    }
}

/// Shape the final model text into the work order's `output_result`.
///
/// Parsed-and-valid JSON passes through as-is. A parse failure or an
/// output-schema violation wraps the raw text as
/// `{"response_text": <raw>}` — the content is final either way, the shape
/// just degrades.
pub fn shape_output(raw: &str, contract: &LoadedContract) -> Value {
    let stripped = strip_code_fences(raw);
    match serde_json::from_str::<Value>(&stripped) {
        Ok(parsed) if parsed.is_object() || parsed.is_array() => {
            match contract.validate_output(&parsed) {
                Ok(()) => parsed,
                Err(errors) => {
                    tracing::debug!(?errors, "final output failed contract schema; wrapping");
                    json!({"response_text": raw})
                }
            }
        }
        _ => json!({"response_text": raw}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_code_fences("hello"), "hello");
        assert_eq!(strip_code_fences("  spaced  "), "spaced");
    }

    #[test]
    fn json_fence_is_stripped() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn bare_fence_is_stripped() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn unterminated_fence_still_yields_body() {
        let fenced = "```json\n{\"a\": 1}";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }
}
