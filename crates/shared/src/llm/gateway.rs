use std::future::Future;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ChatMessage;

pub const THROTTLED_MESSAGE: &str = "요청을 처리하지 못했습니다. 잠시 후 다시 말씀해 주세요. 🙏";
pub const INVALID_REQUEST_MESSAGE: &str =
    "API 검증 오류가 발생했습니다. 요청 형식을 확인해주세요.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_tokens: u32,
    /// Extended thinking budget; `None` disables reasoning output.
    pub reasoning_budget_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model_id: String,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub params: InferenceParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelDelta {
    Text(String),
    Reasoning(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model request timed out")]
    Timeout,
    #[error("model provider throttled the request: {0}")]
    Throttled(String),
    #[error("model provider rejected the request: {0}")]
    InvalidRequest(String),
    #[error("model provider request failed: {0}")]
    ProviderFailure(String),
    #[error("model stream was interrupted: {0}")]
    Stream(String),
}

impl ModelError {
    /// Fixed text shown to the user in place of the assistant reply.
    pub fn user_message(&self) -> String {
        match self {
            Self::Throttled(_) => THROTTLED_MESSAGE.to_string(),
            Self::InvalidRequest(_) => INVALID_REQUEST_MESSAGE.to_string(),
            other => format!("죄송합니다. 오류가 발생했습니다: {other}"),
        }
    }
}

/// A finite sequence of deltas for one request. Re-running a turn means
/// issuing a new request.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelDelta, ModelError>> + Send>>;

pub type ModelStreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ModelStream, ModelError>> + Send + 'a>>;

pub trait ModelGateway: Send + Sync {
    fn stream<'a>(&'a self, request: ModelRequest) -> ModelStreamFuture<'a>;
}

/// Drains a stream and returns only the visible text.
pub async fn collect_text(mut stream: ModelStream) -> Result<String, ModelError> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        if let ModelDelta::Text(chunk) = delta? {
            text.push_str(&chunk);
        }
    }
    Ok(text)
}

/// Opens a stream and collects its text.
pub async fn complete(gateway: &dyn ModelGateway, request: ModelRequest) -> Result<String, ModelError> {
    let stream = gateway.stream(request).await?;
    collect_text(stream).await
}
