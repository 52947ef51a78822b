//! Integration tests for the Langbase client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use review_panel::config::{LangbaseConfig, PipeConfig, RequestConfig};
use review_panel::error::InferenceError;
use review_panel::inference::{CompletionRequest, InferenceProvider};
use review_panel::langbase::{LangbaseClient, Message, PipeRequest};

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32) -> LangbaseClient {
    let config = LangbaseConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };

    let pipes = PipeConfig {
        panel: "review-panel-v1".to_string(),
        model: "openai:gpt-4o-mini".to_string(),
    };

    LangbaseClient::new(&config, request_config, &pipes).expect("Failed to create client")
}

#[cfg(test)]
mod completion_tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_sends_both_messages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(body_partial_json(json!({
                "name": "review-panel-v1",
                "messages": [
                    {"role": "system", "content": "You are a reviewer"},
                    {"role": "user", "content": "Analyse the clause"}
                ],
                "temperature": 0.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "completion": "The clause is a penalty.",
                "threadId": "thread-1"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let request = CompletionRequest::new("You are a reviewer", "Analyse the clause")
            .with_temperature(Some(0.0));
        let completion = client.complete(request).await.unwrap();

        assert_eq!(completion, "The clause is a penalty.");
        assert_eq!(client.model(), "openai:gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_success_false_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "completion": ""
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let err = client
            .complete(CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let request = PipeRequest::new("review-panel-v1", vec![Message::user("hello")]);
        let err = client.call_pipe(request).await.unwrap_err();

        assert!(matches!(err, InferenceError::InvalidResponse { .. }));
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_server_error_without_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let err = client
            .complete(CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();

        match err {
            InferenceError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let err = client
            .complete(CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();

        match err {
            InferenceError::Unavailable { retries, .. } => assert_eq!(retries, 2),
            other => panic!("Expected Unavailable error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes/run"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3);
        let err = client
            .complete(CompletionRequest::new("system", "user"))
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::Api { status: 400, .. }));
    }
}

#[cfg(test)]
mod pipe_management_tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_panel_pipe_creates_pipe() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .and(body_partial_json(json!({
                "name": "review-panel-v1",
                "model": "openai:gpt-4o-mini",
                "upsert": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "review-panel-v1",
                "status": "public",
                "url": "https://langbase.com/test/review-panel-v1"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        client.ensure_panel_pipe().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_panel_pipe_accepts_conflict() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already exists"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        assert!(client.ensure_panel_pipe().await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_panel_pipe_propagates_auth_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/pipes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let err = client.ensure_panel_pipe().await.unwrap_err();
        assert!(matches!(err, InferenceError::Api { status: 401, .. }));
    }
}
