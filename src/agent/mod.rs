//! Panel agents.
//!
//! A role is plain data ([`RoleSpec`]); an [`AgentSession`] drives one role
//! through its ordered phases, carrying a bounded history between them and a
//! per-session [`RateLimiter`] in front of every inference call.

mod rate_limit;
mod role;
mod session;

pub use rate_limit::*;
pub use role::*;
pub use session::*;

use tracing::warn;

// ============================================================================
// Shared Utilities
// ============================================================================

/// Serialize a value to JSON for an invocation log, warning instead of failing.
pub(crate) fn serialize_for_log<T: serde::Serialize>(
    value: &T,
    context: &str,
) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!(
            error = %e,
            context = %context,
            "Failed to serialize value for invocation log"
        );
        serde_json::json!({
            "serialization_error": e.to_string(),
            "context": context
        })
    })
}

/// Extract JSON from a completion, accepting raw JSON or a fenced code block.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    // Scores are sometimes wrapped in prose; take the outermost object
    match (completion.find('{'), completion.rfind('}')) {
        (Some(open), Some(close)) if open < close => Ok(&completion[open..=close]),
        _ => Err(format!(
            "No JSON found in response. First 100 chars: '{}'",
            completion.chars().take(100).collect::<String>()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(
            extract_json_from_completion("  {\"a\": 1}  ").unwrap(),
            "{\"a\": 1}"
        );
    }

    #[test]
    fn test_extract_fenced_json() {
        let completion = "Scores:\n```json\n{\"legal_reasoning\": 7}\n```\nDone";
        assert_eq!(
            extract_json_from_completion(completion).unwrap(),
            "{\"legal_reasoning\": 7}"
        );
    }

    #[test]
    fn test_extract_plain_fence() {
        let completion = "```\n[1, 2]\n```";
        assert_eq!(extract_json_from_completion(completion).unwrap(), "[1, 2]");
    }

    #[test]
    fn test_extract_object_inside_prose() {
        let completion = "Here you go: {\"x\": 2} hope that helps";
        assert_eq!(extract_json_from_completion(completion).unwrap(), "{\"x\": 2}");
    }

    #[test]
    fn test_extract_nothing() {
        let err = extract_json_from_completion("no json at all").unwrap_err();
        assert!(err.contains("No JSON found"));
    }

    #[test]
    fn test_serialize_for_log() {
        let value = serialize_for_log(&vec!["a", "b"], "test");
        assert_eq!(value, serde_json::json!(["a", "b"]));
    }
}
