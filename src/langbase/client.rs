use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, Message, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, PipeConfig, RequestConfig};
use crate::error::{InferenceError, InferenceResult};
use crate::inference::{CompletionRequest, InferenceProvider};
use crate::prompts::PANEL_PIPE_PROMPT;

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
    pipe_name: String,
    model: String,
}

impl LangbaseClient {
    /// Create a new Langbase client bound to the panel pipe
    pub fn new(
        config: &LangbaseConfig,
        request_config: RequestConfig,
        pipes: &PipeConfig,
    ) -> InferenceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(InferenceError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
            pipe_name: pipes.panel.clone(),
            model: pipes.model.clone(),
        })
    }

    /// Call a Langbase pipe with the given request
    pub async fn call_pipe(&self, request: PipeRequest) -> InferenceResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    pipe = %pipe_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %pipe_name,
                        latency_ms = start.elapsed().as_millis(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %pipe_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Langbase pipe call failed"
                    );
                    if !is_retryable(&e) {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        match last_error {
            // Without retries the caller gets the transport error itself
            Some(e) if self.request_config.max_retries == 0 => Err(e),
            other => Err(InferenceError::Unavailable {
                message: other
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
                retries: retries.saturating_sub(1),
            }),
        }
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> InferenceResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    InferenceError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let pipe_response: PipeResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(pipe_response)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Name of the pipe every completion runs through
    pub fn pipe_name(&self) -> &str {
        &self.pipe_name
    }

    /// Create a new pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> InferenceResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating Langbase pipe");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(InferenceError::Http)?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let pipe_response: CreatePipeResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::InvalidResponse {
                    message: format!("Failed to parse create pipe response: {}", e),
                })?;

        info!(
            pipe = %pipe_response.name,
            url = %pipe_response.url,
            "Pipe created successfully"
        );

        Ok(pipe_response)
    }

    /// Ensure the panel pipe exists, creating it if needed
    pub async fn ensure_panel_pipe(&self) -> InferenceResult<()> {
        let request = CreatePipeRequest::new(&self.pipe_name)
            .with_description("Review panel phase, synthesis and scoring calls")
            .with_model(&self.model)
            .with_upsert(true)
            .with_temperature(0.7)
            .with_max_tokens(4000)
            .with_messages(vec![Message::system(PANEL_PIPE_PROMPT)]);

        match self.create_pipe(request).await {
            Ok(_) => {
                info!(pipe = %self.pipe_name, "Panel pipe ready");
                Ok(())
            }
            Err(InferenceError::Api { status: 409, .. }) => {
                // Pipe already exists, that's fine
                info!(pipe = %self.pipe_name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn is_retryable(err: &InferenceError) -> bool {
    match err {
        InferenceError::Timeout { .. } | InferenceError::Http(_) => true,
        InferenceError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl InferenceProvider for LangbaseClient {
    async fn complete(&self, request: CompletionRequest) -> InferenceResult<String> {
        let pipe_request = PipeRequest::new(
            &self.pipe_name,
            vec![
                Message::system(request.system_prompt),
                Message::user(request.user_prompt),
            ],
        )
        .with_temperature(request.temperature);

        let response = self.call_pipe(pipe_request).await?;
        if !response.success {
            return Err(InferenceError::InvalidResponse {
                message: "Pipe run reported success=false".to_string(),
            });
        }
        Ok(response.completion)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
