use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::ChatTurn;

pub type RunBackendFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RunBackendError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    #[serde(alias = "cancelling")]
    InProgress,
    RequiresAction,
    Completed,
    #[serde(alias = "incomplete")]
    Failed,
    Expired,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }

    pub fn stops_polling(&self) -> bool {
        self.is_terminal() || *self == Self::RequiresAction
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One asynchronous run on the job backend, as last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingJob {
    pub id: String,
    pub thread_id: String,
    pub status: JobStatus,
    pub required_tool_calls: Vec<RequestedToolCall>,
    pub last_error: Option<String>,
}

impl PendingJob {
    pub fn requires_action(&self) -> bool {
        self.status == JobStatus::RequiresAction
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutputSubmission {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Error)]
pub enum RunBackendError {
    #[error("run backend request timed out")]
    Timeout,
    #[error("run backend request failed: {0}")]
    ProviderFailure(String),
    #[error("run backend returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
}

/// Thread-and-run job capability of the LLM provider.
pub trait RunBackend: Send + Sync {
    fn create_thread<'a>(&'a self) -> RunBackendFuture<'a, String>;

    fn append_message<'a>(
        &'a self,
        thread_id: &'a str,
        turn: &'a ChatTurn,
    ) -> RunBackendFuture<'a, ()>;

    fn start_run<'a>(
        &'a self,
        thread_id: &'a str,
        instructions: &'a str,
    ) -> RunBackendFuture<'a, PendingJob>;

    fn fetch_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str)
    -> RunBackendFuture<'a, PendingJob>;

    fn submit_tool_outputs<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
        outputs: Vec<ToolOutputSubmission>,
    ) -> RunBackendFuture<'a, PendingJob>;

    fn latest_reply<'a>(&'a self, thread_id: &'a str) -> RunBackendFuture<'a, Option<String>>;
}
