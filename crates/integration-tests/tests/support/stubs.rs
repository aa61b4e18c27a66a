#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use booking_core::llm::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
};
use booking_core::models::ChatTurn;
use booking_core::runs::{
    JobStatus, PendingJob, RequestedToolCall, RunBackend, RunBackendError, RunBackendFuture,
    ToolOutputSubmission,
};
use booking_core::tools::{ToolExecutor, ToolExecutorError, ToolExecutorFuture, ToolInvocation};
use serde_json::Value;
use tokio::sync::Mutex;

/// Tool server stand-in answering invocations in script order.
#[derive(Default)]
pub struct ScriptedTools {
    replies: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedTools {
    pub fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(replies)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().await.clone()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|call| call.tool_name.clone())
            .collect()
    }
}

impl ToolExecutor for ScriptedTools {
    fn execute<'a>(&'a self, invocation: ToolInvocation) -> ToolExecutorFuture<'a> {
        Box::pin(async move {
            self.calls.lock().await.push(invocation);
            self.replies
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| ToolExecutorError::Transport("tool script exhausted".to_string()))
        })
    }
}

/// One observed state of a run, handed out by start, fetch and submit in
/// script order.
#[derive(Debug, Clone)]
pub struct RunObservation {
    pub status: JobStatus,
    pub tool_calls: Vec<RequestedToolCall>,
    pub last_error: Option<String>,
}

impl RunObservation {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            tool_calls: Vec::new(),
            last_error: None,
        }
    }

    pub fn requires(calls: Vec<(&str, &str, Value)>) -> Self {
        Self {
            status: JobStatus::RequiresAction,
            tool_calls: calls
                .into_iter()
                .map(|(id, name, arguments)| RequestedToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                })
                .collect(),
            last_error: None,
        }
    }

    pub fn failed(last_error: &str) -> Self {
        Self {
            status: JobStatus::Failed,
            tool_calls: Vec::new(),
            last_error: Some(last_error.to_string()),
        }
    }
}

/// Run backend stand-in. Once the observation script runs dry every poll
/// sees `idle_status`.
pub struct ScriptedRuns {
    observations: Mutex<VecDeque<RunObservation>>,
    idle_status: JobStatus,
    replies: Mutex<VecDeque<String>>,
    thread_creation_delay: Duration,
    created_threads: AtomicUsize,
    started_runs: AtomicUsize,
    fetches: AtomicUsize,
    appended: Mutex<Vec<(String, ChatTurn)>>,
    instructions: Mutex<Vec<String>>,
    submissions: Mutex<Vec<Vec<ToolOutputSubmission>>>,
}

impl Default for ScriptedRuns {
    fn default() -> Self {
        Self {
            observations: Mutex::new(VecDeque::new()),
            idle_status: JobStatus::InProgress,
            replies: Mutex::new(VecDeque::new()),
            thread_creation_delay: Duration::ZERO,
            created_threads: AtomicUsize::new(0),
            started_runs: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            appended: Mutex::new(Vec::new()),
            instructions: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedRuns {
    pub fn new(observations: Vec<RunObservation>, replies: Vec<&str>) -> Self {
        Self {
            observations: Mutex::new(VecDeque::from(observations)),
            replies: Mutex::new(replies.into_iter().map(ToString::to_string).collect()),
            ..Self::default()
        }
    }

    pub fn with_thread_creation_delay(mut self, delay: Duration) -> Self {
        self.thread_creation_delay = delay;
        self
    }

    pub fn created_threads(&self) -> usize {
        self.created_threads.load(Ordering::SeqCst)
    }

    pub fn started_runs(&self) -> usize {
        self.started_runs.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn appended(&self) -> Vec<(String, ChatTurn)> {
        self.appended.lock().await.clone()
    }

    pub async fn instructions(&self) -> Vec<String> {
        self.instructions.lock().await.clone()
    }

    pub async fn submissions(&self) -> Vec<Vec<ToolOutputSubmission>> {
        self.submissions.lock().await.clone()
    }

    async fn observe(&self, thread_id: &str, run_id: &str) -> PendingJob {
        let observation = self
            .observations
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| RunObservation::status(self.idle_status));

        PendingJob {
            id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            status: observation.status,
            required_tool_calls: observation.tool_calls,
            last_error: observation.last_error,
        }
    }
}

impl RunBackend for ScriptedRuns {
    fn create_thread<'a>(&'a self) -> RunBackendFuture<'a, String> {
        Box::pin(async move {
            if !self.thread_creation_delay.is_zero() {
                tokio::time::sleep(self.thread_creation_delay).await;
            }
            let number = self.created_threads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("thread-{number}"))
        })
    }

    fn append_message<'a>(
        &'a self,
        thread_id: &'a str,
        turn: &'a ChatTurn,
    ) -> RunBackendFuture<'a, ()> {
        Box::pin(async move {
            self.appended
                .lock()
                .await
                .push((thread_id.to_string(), turn.clone()));
            Ok(())
        })
    }

    fn start_run<'a>(
        &'a self,
        thread_id: &'a str,
        instructions: &'a str,
    ) -> RunBackendFuture<'a, PendingJob> {
        Box::pin(async move {
            self.instructions
                .lock()
                .await
                .push(instructions.to_string());
            let number = self.started_runs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(self.observe(thread_id, &format!("run-{number}")).await)
        })
    }

    fn fetch_run<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
    ) -> RunBackendFuture<'a, PendingJob> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.observe(thread_id, run_id).await)
        })
    }

    fn submit_tool_outputs<'a>(
        &'a self,
        thread_id: &'a str,
        run_id: &'a str,
        outputs: Vec<ToolOutputSubmission>,
    ) -> RunBackendFuture<'a, PendingJob> {
        Box::pin(async move {
            self.submissions.lock().await.push(outputs);
            Ok(self.observe(thread_id, run_id).await)
        })
    }

    fn latest_reply<'a>(&'a self, _thread_id: &'a str) -> RunBackendFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.replies.lock().await.pop_front()) })
    }
}

/// Completion stand-in returning scripted contents; an exhausted script
/// behaves like a provider outage.
#[derive(Default)]
pub struct ScriptedLlm {
    contents: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<LlmGatewayRequest>>,
}

impl ScriptedLlm {
    pub fn new(contents: Vec<&str>) -> Self {
        Self {
            contents: Mutex::new(contents.into_iter().map(ToString::to_string).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<LlmGatewayRequest> {
        self.requests.lock().await.clone()
    }
}

impl LlmGateway for ScriptedLlm {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            self.requests.lock().await.push(request);
            let content = self.contents.lock().await.pop_front().ok_or_else(|| {
                LlmGatewayError::ProviderFailure("llm script exhausted".to_string())
            })?;

            Ok(LlmGatewayResponse {
                model: "scripted-model".to_string(),
                provider_request_id: None,
                content,
                usage: None,
            })
        })
    }
}
