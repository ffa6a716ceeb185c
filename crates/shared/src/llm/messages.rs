use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt, stream};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::gateway::{
    ModelDelta, ModelError, ModelGateway, ModelRequest, ModelStream, ModelStreamFuture,
};
use super::sse::{SseDecoder, StreamEvent};
use crate::config::ConfigError;
use crate::config_env::{optional_trimmed_env, parse_u32_env, parse_u64_env, require_env};
use crate::models::Role;

const DEFAULT_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_REGION: &str = "us-west-2";
const DEFAULT_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 250;
// Non-standard status used by the Messages API when the service is overloaded.
const STATUS_OVERLOADED: u16 = 529;

#[derive(Debug, Clone)]
pub struct MessagesGatewayConfig {
    pub messages_url: String,
    pub api_key: String,
    pub api_version: String,
    pub region: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
}

impl MessagesGatewayConfig {
    pub fn from_env() -> Result<Self, ModelGatewayConfigError> {
        let api_key = require_env("MODEL_API_KEY")?;
        let messages_url = optional_trimmed_env("MODEL_API_URL")
            .unwrap_or_else(|| DEFAULT_MESSAGES_URL.to_string());
        if !messages_url.starts_with("http://") && !messages_url.starts_with("https://") {
            return Err(ModelGatewayConfigError::InvalidConfiguration(
                "MODEL_API_URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            messages_url,
            api_key,
            api_version: optional_trimmed_env("MODEL_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            region: optional_trimmed_env("MODEL_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            timeout_ms: parse_u64_env("MODEL_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            max_retries: parse_u32_env("MODEL_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base_backoff_ms: parse_u64_env(
                "MODEL_RETRY_BASE_BACKOFF_MS",
                DEFAULT_RETRY_BASE_BACKOFF_MS,
            )?,
        })
    }
}

#[derive(Debug, Error)]
pub enum ModelGatewayConfigError {
    #[error(transparent)]
    Env(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to build model http client: {0}")]
    HttpClient(String),
}

/// Streaming client for a Messages-compatible endpoint.
#[derive(Clone)]
pub struct MessagesGateway {
    client: reqwest::Client,
    config: MessagesGatewayConfig,
}

impl MessagesGateway {
    pub fn new(config: MessagesGatewayConfig) -> Result<Self, ModelGatewayConfigError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(
                DEFAULT_CONNECT_TIMEOUT_MS.min(config.timeout_ms),
            ))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ModelGatewayConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Retries happen only before the first byte of the stream is consumed.
    async fn open_stream(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let mut attempt = 0_u32;

        loop {
            match self.send_once(body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if err.retryable && attempt < self.config.max_retries {
                        let backoff_multiplier = 2_u64.saturating_pow(attempt);
                        let backoff_ms = self
                            .config
                            .retry_base_backoff_ms
                            .saturating_mul(backoff_multiplier);
                        warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            backoff_ms,
                            error = %err.error,
                            "retrying model stream request"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Err(err.error);
                }
            }
        }
    }

    async fn send_once(&self, body: &Value) -> Result<reqwest::Response, SendAttemptError> {
        let response = self
            .client
            .post(&self.config.messages_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    SendAttemptError::retryable(ModelError::Timeout)
                } else {
                    SendAttemptError::retryable(ModelError::ProviderFailure(
                        "request_unavailable".to_string(),
                    ))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error_type = parse_provider_error_type(&body);
        let detail = format!("status={} type={error_type}", status.as_u16());
        let error = if status == StatusCode::TOO_MANY_REQUESTS
            || status.as_u16() == STATUS_OVERLOADED
        {
            ModelError::Throttled(detail)
        } else if status == StatusCode::BAD_REQUEST {
            ModelError::InvalidRequest(detail)
        } else {
            ModelError::ProviderFailure(detail)
        };

        Err(SendAttemptError {
            error,
            retryable: is_retryable_status(status),
        })
    }
}

impl ModelGateway for MessagesGateway {
    fn stream<'a>(&'a self, request: ModelRequest) -> ModelStreamFuture<'a> {
        Box::pin(async move {
            let body = request_body(&request);
            info!(
                model = %request.model_id,
                region = %self.config.region,
                message_count = request.messages.len(),
                reasoning = request.params.reasoning_budget_tokens.is_some(),
                "opening model stream"
            );

            let response = self.open_stream(&body).await?;
            Ok(delta_stream(response))
        })
    }
}

pub(crate) fn request_body(request: &ModelRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect::<Vec<_>>();

    let params = &request.params;
    let mut body = json!({
        "model": request.model_id,
        "max_tokens": params.max_tokens,
        "messages": messages,
        "temperature": params.temperature,
        "stream": true,
    });
    if !request.system_prompt.trim().is_empty() {
        body["system"] = json!(request.system_prompt);
    }
    if let Some(top_p) = params.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(top_k) = params.top_k {
        body["top_k"] = json!(top_k);
    }
    if let Some(budget_tokens) = params.reasoning_budget_tokens {
        body["thinking"] = json!({
            "type": "enabled",
            "budget_tokens": budget_tokens,
        });
    }

    body
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>;

struct DeltaStreamState {
    bytes: ByteStream,
    decoder: SseDecoder,
    queued: VecDeque<Result<ModelDelta, ModelError>>,
    finished: bool,
}

impl DeltaStreamState {
    fn enqueue(&mut self, events: Vec<StreamEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match event {
                StreamEvent::Delta(delta) => self.queued.push_back(Ok(delta)),
                StreamEvent::Stop => self.finished = true,
                StreamEvent::Failed(error) => {
                    self.queued.push_back(Err(error));
                    self.finished = true;
                }
            }
        }
    }
}

fn delta_stream(response: reqwest::Response) -> ModelStream {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|err| err.to_string()));
    let state = DeltaStreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        queued: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queued.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.enqueue(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    state.queued.push_back(Err(ModelError::Stream(err)));
                }
                None => {
                    let events = state.decoder.finish();
                    state.enqueue(events);
                    if !state.finished {
                        debug!("model stream closed without message_stop");
                    }
                    state.finished = true;
                }
            }
        }
    }))
}

#[derive(Debug)]
struct SendAttemptError {
    error: ModelError,
    retryable: bool,
}

impl SendAttemptError {
    fn retryable(error: ModelError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    ) || status.as_u16() == STATUS_OVERLOADED
}

fn parse_provider_error_type(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorDetails>,
    }

    #[derive(Deserialize)]
    struct ProviderErrorDetails {
        #[serde(rename = "type")]
        kind: Option<String>,
    }

    serde_json::from_str::<ProviderErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|details| details.kind)
        .unwrap_or_else(|| "unknown".to_string())
}
