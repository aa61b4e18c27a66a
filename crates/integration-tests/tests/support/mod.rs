#![allow(dead_code)]

pub mod stubs;

use std::sync::Arc;

use booking_core::flow::FlowStrategy;
use booking_core::models::TurnResponse;
use booking_core::session::{InMemorySessionStore, Session, SessionStore};
use booking_core::{Capabilities, OrchestratorConfig, SessionOrchestrator};
use serde_json::{Value, json};

use stubs::{ScriptedLlm, ScriptedRuns, ScriptedTools};

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_ms: 1,
        poll_max_attempts: 3,
        ..OrchestratorConfig::default()
    }
}

pub fn routed_config() -> OrchestratorConfig {
    OrchestratorConfig {
        flow_strategy: FlowStrategy::Routed,
        ..test_config()
    }
}

/// An orchestrator wired to scripted capabilities, with handles kept for
/// assertions.
pub struct Harness {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub tools: Arc<ScriptedTools>,
    pub runs: Arc<ScriptedRuns>,
    pub llm: Arc<ScriptedLlm>,
    pub store: InMemorySessionStore,
}

impl Harness {
    pub fn new(
        config: OrchestratorConfig,
        tools: ScriptedTools,
        runs: ScriptedRuns,
        llm: ScriptedLlm,
    ) -> Self {
        let tools = Arc::new(tools);
        let runs = Arc::new(runs);
        let llm = Arc::new(llm);
        let store = InMemorySessionStore::new();

        let orchestrator = SessionOrchestrator::new(
            &config,
            Capabilities {
                tools: tools.clone(),
                llm: llm.clone(),
                runs: runs.clone(),
                store: Arc::new(store.clone()),
            },
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            tools,
            runs,
            llm,
            store,
        }
    }

    pub fn guided(tools: Vec<Value>, runs: ScriptedRuns) -> Self {
        Self::new(
            test_config(),
            ScriptedTools::new(tools),
            runs,
            ScriptedLlm::default(),
        )
    }

    pub async fn seed(&self, session: Session) {
        self.store
            .save(session)
            .await
            .expect("seeding a session should succeed");
    }

    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.store
            .load(session_id)
            .await
            .expect("loading a session should succeed")
    }

    pub async fn say(&self, session_id: &str, message: &str) -> TurnResponse {
        self.orchestrator.take_turn(session_id, message).await
    }
}

pub fn locations_payload() -> Value {
    json!({"locations": [{"id": "loc-1", "name": "Sandbox Location"}]})
}

pub fn create_cart_payload() -> Value {
    json!({"createCart": {"cart": {"id": "cart-1"}}})
}

pub fn services_payload() -> Value {
    json!({"services": [
        {"id": "svc-1", "name": "Haircut"},
        {"id": "svc-2", "name": "Signature Facial"}
    ]})
}
