use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::TurnFailure;
use crate::flow::intent::is_reset;
use crate::flow::{BookingSteps, FlowDriver, FlowOutcome, FlowStrategy, build_flow};
use crate::llm::prompts::run_instructions;
use crate::llm::{LlmGateway, collapse_whitespace, sanitize_untrusted_text};
use crate::models::{AssistantReply, ChatTurn, TurnResponse};
use crate::runs::{
    JobStatus, LoopOutcome, PaymentHandoff, RunBackend, RunBackendError, RunPoller, ToolCallLoop,
};
use crate::session::{Session, SessionStore, ThreadRegistry, ThreadState};
use crate::tools::{ToolExecutor, ToolGateway};

const EMPTY_MESSAGE_REPLY: &str = "I didn't catch that. What would you like to book?";

/// External capabilities the orchestrator drives.
#[derive(Clone)]
pub struct Capabilities {
    pub tools: Arc<dyn ToolExecutor>,
    pub llm: Arc<dyn LlmGateway>,
    pub runs: Arc<dyn RunBackend>,
    pub store: Arc<dyn SessionStore>,
}

/// Entry point for one user message. Owns the session store and the thread
/// lifecycle; the booking flow and the tool loop only ever see a session
/// borrowed for the length of a turn.
pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    runs: Arc<dyn RunBackend>,
    threads: ThreadRegistry,
    flow: Arc<dyn FlowDriver>,
    poller: RunPoller,
    tool_loop: ToolCallLoop,
    tool_loop_max_iterations: u32,
    thread_message_ceiling: u32,
    history_max_turns: usize,
    session_idle_ttl: TimeDelta,
}

impl SessionOrchestrator {
    pub fn new(config: &OrchestratorConfig, capabilities: Capabilities) -> Self {
        let gateway = ToolGateway::new(capabilities.tools);
        let steps = BookingSteps::new(gateway.clone(), config);
        let flow = build_flow(config.flow_strategy, steps, capabilities.llm);
        let poller = RunPoller::new(
            Duration::from_millis(config.poll_interval_ms),
            config.poll_max_attempts,
        );
        let tool_loop = ToolCallLoop::new(
            gateway,
            poller,
            config.tool_loop_max_iterations,
            PaymentHandoff {
                tool_name: config.payment_tool_name.clone(),
                page_url: config.payment_page_url.clone(),
            },
        );

        Self {
            store: capabilities.store,
            runs: capabilities.runs,
            threads: ThreadRegistry::new(),
            flow,
            poller,
            tool_loop,
            tool_loop_max_iterations: config.tool_loop_max_iterations,
            thread_message_ceiling: config.thread_message_ceiling,
            history_max_turns: config.history_max_turns,
            session_idle_ttl: i64::try_from(config.session_idle_ttl_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn flow_strategy(&self) -> FlowStrategy {
        self.flow.strategy()
    }

    pub async fn take_turn(&self, session_id: &str, message: &str) -> TurnResponse {
        let turn_id = Uuid::new_v4();
        let started = Instant::now();
        let text = collapse_whitespace(message);
        if text.is_empty() {
            return TurnResponse {
                reply: AssistantReply::text(EMPTY_MESSAGE_REPLY),
            };
        }
        let context_text = sanitize_untrusted_text(&text);

        let mut session = self.load_session(session_id).await;

        let reply = if is_reset(&text) {
            if !session.is_blank() {
                info!(session_id, %turn_id, "session reset by greeting");
            }
            session.reset();
            self.threads.forget(session_id);
            let outcome = self.flow.start(&mut session).await;
            self.resolve(&mut session, turn_id, outcome, &context_text)
                .await
        } else {
            let outcome = self.flow.advance(&mut session, &text).await;
            self.resolve(&mut session, turn_id, outcome, &context_text)
                .await
        };

        session.record_turn(ChatTurn::user(context_text), self.history_max_turns);
        session.record_turn(
            ChatTurn::assistant(reply.content.clone()),
            self.history_max_turns,
        );

        if session.checkout_completed {
            info!(session_id, %turn_id, "checkout completed; dropping session");
            self.threads.forget(session_id);
            if let Err(err) = self.store.remove(session_id).await {
                warn!(session_id, %turn_id, error = %err, "failed to drop completed session");
            }
        } else if let Err(err) = self.store.save(session.clone()).await {
            warn!(session_id, %turn_id, error = %err, "failed to save session");
        }

        info!(
            session_id,
            %turn_id,
            step = session.step.as_str(),
            frontend_action = reply.frontend_action.is_some(),
            latency_ms = started.elapsed().as_millis() as u64,
            "turn completed"
        );

        TurnResponse { reply }
    }

    /// Drops a session and its thread. Returns whether a session existed.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        let had_thread = self.threads.forget(session_id);
        match self.store.remove(session_id).await {
            Ok(removed) => {
                info!(session_id, removed, had_thread, "session cleared");
                removed
            }
            Err(err) => {
                warn!(session_id, error = %err, "failed to clear session");
                false
            }
        }
    }

    /// Drops sessions idle longer than the configured TTL, with their
    /// threads. Returns how many were dropped.
    pub async fn prune_idle_sessions(&self, now: DateTime<Utc>) -> usize {
        let Some(idle_before) = now.checked_sub_signed(self.session_idle_ttl) else {
            return 0;
        };
        match self.store.prune_idle(idle_before).await {
            Ok(pruned) => {
                for session_id in &pruned {
                    self.threads.forget(session_id);
                }
                if !pruned.is_empty() {
                    info!(pruned = pruned.len(), "pruned idle sessions");
                }
                pruned.len()
            }
            Err(err) => {
                warn!(error = %err, "failed to prune idle sessions");
                0
            }
        }
    }

    pub fn spawn_pruner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                orchestrator.prune_idle_sessions(Utc::now()).await;
            }
        })
    }

    async fn load_session(&self, session_id: &str) -> Session {
        match self.store.load(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!(session_id, "starting new session");
                Session::new(session_id)
            }
            Err(err) => {
                warn!(session_id, error = %err, "session store unavailable; starting fresh session");
                Session::new(session_id)
            }
        }
    }

    async fn resolve(
        &self,
        session: &mut Session,
        turn_id: Uuid,
        outcome: FlowOutcome,
        context_text: &str,
    ) -> AssistantReply {
        let result = match outcome {
            FlowOutcome::Reply(text) => Ok(AssistantReply::text(text)),
            FlowOutcome::Failed(failure) => Err(failure),
            FlowOutcome::Handoff { instructions } => {
                self.run_assistant_turn(session, context_text, instructions.as_deref())
                    .await
            }
        };

        result.unwrap_or_else(|failure| {
            warn!(
                session_id = %session.id,
                %turn_id,
                kind = failure.kind(),
                error = %failure,
                "turn ended with a soft failure"
            );
            AssistantReply::text(failure.user_message())
        })
    }

    async fn run_assistant_turn(
        &self,
        session: &mut Session,
        text: &str,
        extra_instructions: Option<&str>,
    ) -> Result<AssistantReply, TurnFailure> {
        let thread_id = self.ensure_thread(session).await?;

        self.runs
            .append_message(&thread_id, &ChatTurn::user(text))
            .await
            .map_err(external)?;
        session.thread.message_count = session.thread.message_count.saturating_add(1);

        let mut instructions = run_instructions(session);
        if let Some(extra) = extra_instructions {
            instructions.push_str("\n\n");
            instructions.push_str(extra);
        }

        let job = self
            .runs
            .start_run(&thread_id, &instructions)
            .await
            .map_err(external)?;
        let job = self
            .poller
            .await_terminal(self.runs.as_ref(), job)
            .await
            .map_err(external)?;
        let job = match self
            .tool_loop
            .drive(self.runs.as_ref(), session, job)
            .await
            .map_err(external)?
        {
            LoopOutcome::PaymentReady(reply) => {
                self.abandon_thread(session, "payment handoff");
                return Ok(reply);
            }
            LoopOutcome::Settled(job) => job,
        };

        if !job.status.is_terminal() {
            self.abandon_thread(session, job.status.as_str());
        }

        match job.status {
            JobStatus::Completed => {
                let reply = self
                    .runs
                    .latest_reply(&thread_id)
                    .await
                    .map_err(external)?
                    .filter(|text| !text.trim().is_empty())
                    .ok_or_else(|| {
                        TurnFailure::MalformedModelOutput(
                            "run completed without an assistant message".to_string(),
                        )
                    })?;
                session.thread.message_count = session.thread.message_count.saturating_add(1);
                Ok(AssistantReply::text(reply))
            }
            JobStatus::RequiresAction => Err(TurnFailure::LoopExhaustion {
                iterations: self.tool_loop_max_iterations,
            }),
            status if status.is_terminal() => Err(TurnFailure::RunFailed {
                status: job
                    .last_error
                    .map(|error| format!("{} ({error})", status.as_str()))
                    .unwrap_or_else(|| status.as_str().to_string()),
            }),
            _ => Err(TurnFailure::PollExhaustion {
                attempts: self.poller.max_attempts(),
            }),
        }
    }

    /// Returns the session's thread, creating it at most once per session
    /// and rotating it once it has carried `thread_message_ceiling` messages.
    async fn ensure_thread(&self, session: &mut Session) -> Result<String, TurnFailure> {
        if session.thread.message_count >= self.thread_message_ceiling {
            info!(
                session_id = %session.id,
                message_count = session.thread.message_count,
                "rotating conversation thread"
            );
            self.threads.forget(&session.id);
            session.thread = ThreadState::default();
        }

        let known_thread = session.thread.thread_id.clone();
        let runs = self.runs.clone();
        let thread_id = self
            .threads
            .get_or_create(&session.id, || async move {
                match known_thread {
                    Some(thread_id) => Ok::<_, RunBackendError>(thread_id),
                    None => runs.create_thread().await,
                }
            })
            .await
            .map_err(external)?;

        if session.thread.thread_id.as_deref() != Some(thread_id.as_str()) {
            info!(session_id = %session.id, thread_id = %thread_id, "conversation thread attached");
            session.thread = ThreadState {
                thread_id: Some(thread_id.clone()),
                message_count: 0,
            };
        }
        Ok(thread_id)
    }

    /// Detaches a thread whose run is still active. The backend refuses new
    /// messages on such a thread, so the next turn starts a fresh one.
    fn abandon_thread(&self, session: &mut Session, reason: &str) {
        self.threads.forget(&session.id);
        if let Some(thread_id) = session.thread.thread_id.take() {
            info!(
                session_id = %session.id,
                thread_id = %thread_id,
                reason,
                "abandoning thread with an unfinished run"
            );
        }
        session.thread = ThreadState::default();
    }
}

fn external(err: RunBackendError) -> TurnFailure {
    TurnFailure::ExternalCallFailure(err.to_string())
}
