use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;
use crate::config_env::{
    EnvLookup, optional_trimmed_env, parse_u64_env, process_env, require_env, require_http_url,
};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

pub type ToolExecutorFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, ToolExecutorError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Error)]
pub enum ToolExecutorError {
    #[error("tool server request timed out")]
    Timeout,
    #[error("tool server request failed: {0}")]
    Transport(String),
    #[error("tool server rejected {tool}: status={status}")]
    Rejected { tool: String, status: u16 },
    #[error("tool server returned an unreadable body: {0}")]
    InvalidPayload(String),
}

pub trait ToolExecutor: Send + Sync {
    fn execute<'a>(&'a self, invocation: ToolInvocation) -> ToolExecutorFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct HttpToolExecutorConfig {
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl HttpToolExecutorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint_url: require_http_url(
                "TOOL_SERVER_URL",
                require_env(lookup, "TOOL_SERVER_URL")?,
            )?,
            api_key: optional_trimmed_env(lookup, "TOOL_SERVER_API_KEY"),
            timeout_ms: parse_u64_env(lookup, "TOOL_SERVER_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
        })
    }
}

/// Posts `{toolName, arguments}` to a tool server and hands back the body.
#[derive(Clone)]
pub struct HttpToolExecutor {
    client: reqwest::Client,
    config: HttpToolExecutorConfig,
}

impl HttpToolExecutor {
    pub fn new(config: HttpToolExecutorConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    async fn send(&self, invocation: &ToolInvocation) -> Result<Value, ToolExecutorError> {
        let mut request = self.client.post(&self.config.endpoint_url).json(invocation);
        if let Some(api_key) = self.config.api_key.as_deref() {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ToolExecutorError::Timeout
            } else {
                ToolExecutorError::Transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolExecutorError::Rejected {
                tool: invocation.tool_name.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| ToolExecutorError::InvalidPayload(err.to_string()))?;
        Ok(serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body)))
    }
}

impl ToolExecutor for HttpToolExecutor {
    fn execute<'a>(&'a self, invocation: ToolInvocation) -> ToolExecutorFuture<'a> {
        Box::pin(async move { self.send(&invocation).await })
    }
}
