use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matcher::OptionCandidate;
use crate::models::{BookingState, ChatTurn, FlowStep};

/// Conversation thread on the run backend. Only the thread lifecycle in the
/// orchestrator writes these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadState {
    pub thread_id: Option<String>,
    pub message_count: u32,
}

/// Option lists most recently shown to the user, kept so a reply can be
/// validated without refetching.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionCache {
    pub locations: Option<Vec<OptionCandidate>>,
    pub services: Option<Vec<OptionCandidate>>,
    pub dates: Option<Vec<OptionCandidate>>,
    pub times: Option<Vec<OptionCandidate>>,
    pub staff: Option<Vec<OptionCandidate>>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub history: Vec<ChatTurn>,
    pub booking: BookingState,
    pub thread: ThreadState,
    pub step: FlowStep,
    pub options: OptionCache,
    pub service_hint: Option<String>,
    pub checkout_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            history: Vec::new(),
            booking: BookingState::default(),
            thread: ThreadState::default(),
            step: FlowStep::New,
            options: OptionCache::default(),
            service_hint: None,
            checkout_completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.booking = BookingState::default();
        self.thread = ThreadState::default();
        self.step = FlowStep::New;
        self.options = OptionCache::default();
        self.service_hint = None;
        self.checkout_completed = false;
        self.updated_at = Utc::now();
    }

    pub fn record_turn(&mut self, turn: ChatTurn, max_turns: usize) {
        self.history.push(turn);
        if self.history.len() > max_turns {
            let overflow = self.history.len() - max_turns;
            self.history.drain(..overflow);
        }
        self.updated_at = Utc::now();
    }

    pub fn is_blank(&self) -> bool {
        self.history.is_empty() && self.booking == BookingState::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_conversation_and_booking() {
        let mut session = Session::new("s-1");
        session.record_turn(ChatTurn::user("book a facial"), 10);
        session.booking.cart_id = Some("cart-1".to_string());
        session.thread.thread_id = Some("thread-1".to_string());
        session.thread.message_count = 4;
        session.step = FlowStep::ServicePending;

        session.reset();

        assert!(session.is_blank());
        assert_eq!(session.thread, ThreadState::default());
        assert_eq!(session.step, FlowStep::New);
        assert_eq!(session.id, "s-1");
    }

    #[test]
    fn history_keeps_most_recent_turns() {
        let mut session = Session::new("s-1");
        for index in 0..5 {
            session.record_turn(ChatTurn::user(format!("message {index}")), 3);
        }
        let contents = session
            .history
            .iter()
            .map(|turn| turn.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
    }
}
