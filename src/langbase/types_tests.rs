//! Unit tests for Langbase API types.

use super::*;
use serde_json::json;

#[test]
fn test_message_constructors() {
    let msg = Message::system("You are a reviewer");
    assert_eq!(msg.role, MessageRole::System);
    assert_eq!(msg.content, "You are a reviewer");

    let msg = Message::user("Analyse this");
    assert_eq!(msg.role, MessageRole::User);
}

#[test]
fn test_pipe_request_serializes_without_temperature_by_default() {
    let req = PipeRequest::new("panel", vec![Message::user("q")]);
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        value,
        json!({
            "name": "panel",
            "messages": [{"role": "user", "content": "q"}],
            "stream": false
        })
    );
}

#[test]
fn test_pipe_request_with_temperature() {
    let req = PipeRequest::new("panel", vec![]).with_temperature(Some(0.2));
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["temperature"], json!(0.2));
}

#[test]
fn test_pipe_response_deserializes_minimal_body() {
    let resp: PipeResponse = serde_json::from_value(json!({
        "success": true,
        "completion": "done"
    }))
    .unwrap();
    assert!(resp.success);
    assert_eq!(resp.completion, "done");
    assert!(resp.thread_id.is_none());
    assert!(resp.raw.is_none());
}

#[test]
fn test_create_pipe_request_skips_unset_fields() {
    let req = CreatePipeRequest::new("panel")
        .with_model("openai:gpt-4o-mini")
        .with_upsert(true);
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(
        value,
        json!({"name": "panel", "model": "openai:gpt-4o-mini", "upsert": true})
    );
}
