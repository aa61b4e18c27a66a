use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::ChatTurn;

pub type LlmGatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<LlmGatewayResponse, LlmGatewayError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonSchema { name: String, schema: Value },
}

#[derive(Debug, Clone)]
pub struct LlmGatewayRequest {
    pub requester_id: Option<String>,
    pub system_prompt: String,
    pub messages: Vec<ChatTurn>,
    pub response_format: ResponseFormat,
}

impl LlmGatewayRequest {
    pub fn text(system_prompt: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self {
            requester_id: None,
            system_prompt: system_prompt.into(),
            messages,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn structured(
        system_prompt: impl Into<String>,
        messages: Vec<ChatTurn>,
        name: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            requester_id: None,
            system_prompt: system_prompt.into(),
            messages,
            response_format: ResponseFormat::JsonSchema {
                name: name.into(),
                schema,
            },
        }
    }

    pub fn with_requester_id(mut self, requester_id: impl AsRef<str>) -> Self {
        let trimmed = requester_id.as_ref().trim();
        if !trimmed.is_empty() {
            self.requester_id = Some(trimmed.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmTokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmGatewayResponse {
    pub model: String,
    pub provider_request_id: Option<String>,
    pub content: String,
    pub usage: Option<LlmTokenUsage>,
}

#[derive(Debug, Error)]
pub enum LlmGatewayError {
    #[error("llm provider request timed out")]
    Timeout,
    #[error("llm provider request failed: {0}")]
    ProviderFailure(String),
    #[error("llm provider returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
}

pub trait LlmGateway: Send + Sync {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a>;
}
