use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::backend::{
    JobStatus, PendingJob, RequestedToolCall, RunBackend, RunBackendError, RunBackendFuture,
    ToolOutputSubmission,
};
use crate::config::ConfigError;
use crate::config_env::{
    EnvLookup, optional_trimmed_env, parse_u64_env, process_env, require_env, require_http_url,
};
use crate::models::{ChatRole, ChatTurn};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const ASSISTANTS_BETA_HEADER: &str = "assistants=v2";

#[derive(Debug, Clone)]
pub struct AssistantsBackendConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub assistant_id: String,
    pub timeout_ms: u64,
}

impl AssistantsBackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let api_base_url = optional_trimmed_env(lookup, "OPENAI_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        Ok(Self {
            api_base_url: require_http_url("OPENAI_API_BASE_URL", api_base_url)?
                .trim_end_matches('/')
                .to_string(),
            api_key: require_env(lookup, "OPENAI_API_KEY")?,
            assistant_id: require_env(lookup, "OPENAI_ASSISTANT_ID")?,
            timeout_ms: parse_u64_env(lookup, "OPENAI_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
        })
    }
}

/// Threads and runs over the OpenAI Assistants v2 REST surface.
#[derive(Clone)]
pub struct AssistantsRunBackend {
    client: reqwest::Client,
    config: AssistantsBackendConfig,
}

impl AssistantsRunBackend {
    pub fn new(config: AssistantsBackendConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base_url)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, RunBackendError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA_HEADER)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_json(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RunBackendError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.config.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA_HEADER)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_json(response).await
    }
}

impl RunBackend for AssistantsRunBackend {
    fn create_thread<'a>(&'a self) -> RunBackendFuture<'a, String> {
        Box::pin(async move {
            let thread: WireObject = self.post("/threads", json!({})).await?;
            Ok(thread.id)
        })
    }

    fn append_message<'a>(
        &'a self,
        thread_id: &'a str,
        turn: &'a ChatTurn,
    ) -> RunBackendFuture<'a, ()> {
        Box::pin(async move {
            let role = match turn.role {
                ChatRole::Assistant => "assistant",
                ChatRole::User | ChatRole::System => "user",
            };
            let _: WireObject = self
                .post(
                    &format!("/threads/{thread_id}/messages"),
                    json!({"role": role, "content": turn.content}),
                )
                .await?;
            Ok(())
        })
    }

    fn start_run<'a>(
        &'a self,
        thread_id: &'a str,
        instructions: &'a str,
    ) -> RunBackendFuture<'a, PendingJob> {
        Box::pin(async move {
            let run: WireRun = self
                .post(
                    &format!("/threads/{thread_id}/runs"),
                    json!({
                        "assistant_id": self.config.assistant_id,
                        "additional_instructions": instructions,
                    }),
                )
                .await?;
            Ok(run.into_job(thread_id))
        })
    }

    fn fetch_run<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
    ) -> RunBackendFuture<'a, PendingJob> {
        Box::pin(async move {
            let run: WireRun = self
                .get(&format!("/threads/{thread_id}/runs/{run_id}"))
                .await?;
            Ok(run.into_job(thread_id))
        })
    }

    fn submit_tool_outputs<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
        outputs: Vec<ToolOutputSubmission>,
    ) -> RunBackendFuture<'a, PendingJob> {
        Box::pin(async move {
            let run: WireRun = self
                .post(
                    &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                    json!({ "tool_outputs": outputs }),
                )
                .await?;
            Ok(run.into_job(thread_id))
        })
    }

    fn latest_reply<'a>(&'a self, thread_id: &'a str) -> RunBackendFuture<'a, Option<String>> {
        Box::pin(async move {
            let page: WireMessagePage = self
                .get(&format!("/threads/{thread_id}/messages?order=desc&limit=10"))
                .await?;
            Ok(page
                .data
                .into_iter()
                .filter(|message| message.role == "assistant")
                .find_map(|message| {
                    message
                        .content
                        .into_iter()
                        .find_map(|part| part.text.map(|text| text.value))
                }))
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RunBackendError> {
    let status = response.status();
    let body = response.text().await.map_err(|_| {
        RunBackendError::InvalidProviderPayload("response_body_read_failed".to_string())
    })?;

    if !status.is_success() {
        return Err(RunBackendError::ProviderFailure(format!(
            "status={} code={}",
            status.as_u16(),
            provider_error_code(status, &body)
        )));
    }

    serde_json::from_str::<T>(&body)
        .map_err(|_| RunBackendError::InvalidProviderPayload("response_json_parse_failed".to_string()))
}

fn map_transport_error(err: reqwest::Error) -> RunBackendError {
    if err.is_timeout() {
        RunBackendError::Timeout
    } else {
        RunBackendError::ProviderFailure("request_unavailable".to_string())
    }
}

fn provider_error_code(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/code")
                .or_else(|| value.pointer("/error/type"))
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string())
}

#[derive(Debug, Deserialize)]
struct WireObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    status: JobStatus,
    #[serde(default)]
    required_action: Option<WireRequiredAction>,
    #[serde(default)]
    last_error: Option<WireRunError>,
}

impl WireRun {
    fn into_job(self, thread_id: &str) -> PendingJob {
        let required_tool_calls = self
            .required_action
            .and_then(|action| action.submit_tool_outputs)
            .map(|outputs| {
                outputs
                    .tool_calls
                    .into_iter()
                    .map(|call| RequestedToolCall {
                        id: call.id,
                        arguments: serde_json::from_str::<Value>(&call.function.arguments)
                            .unwrap_or(Value::String(call.function.arguments)),
                        name: call.function.name,
                    })
                    .collect()
            })
            .unwrap_or_default();

        PendingJob {
            id: self.id,
            thread_id: thread_id.to_string(),
            status: self.status,
            required_tool_calls,
            last_error: self.last_error.and_then(|err| err.message.or(err.code)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRequiredAction {
    #[serde(default)]
    submit_tool_outputs: Option<WireSubmitToolOutputs>,
}

#[derive(Debug, Deserialize)]
struct WireSubmitToolOutputs {
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireRunError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessagePage {
    #[serde(default)]
    data: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Vec<WireMessagePart>,
}

#[derive(Debug, Deserialize)]
struct WireMessagePart {
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    value: String,
}
