use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TurnFailure;
use crate::llm::LlmGateway;
use crate::session::Session;

mod guided;
pub mod intent;
mod routed;
mod steps;

pub use guided::GuidedFlow;
pub use routed::RoutedFlow;
pub use steps::{
    BookingSteps, OptionSource, Prerequisite, SlotReservation, StepError, match_free_text,
    render_options, render_summary,
};

pub(crate) const CONFIRMED_INSTRUCTIONS: &str = "The customer has confirmed the booking summary. \
Prepare payment for the cart now.";

pub type FlowFuture<'a> = Pin<Box<dyn Future<Output = FlowOutcome> + Send + 'a>>;

/// What a flow decided for one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Reply(String),
    /// The turn belongs to the assistant run on the conversation thread.
    Handoff {
        instructions: Option<String>,
    },
    Failed(TurnFailure),
}

/// One realization of the booking state machine.
pub trait FlowDriver: Send + Sync {
    fn strategy(&self) -> FlowStrategy;

    /// First prompt of a fresh booking.
    fn start<'a>(&'a self, session: &'a mut Session) -> FlowFuture<'a>;

    fn advance<'a>(&'a self, session: &'a mut Session, message: &'a str) -> FlowFuture<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStrategy {
    Guided,
    Routed,
}

impl FlowStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guided => "guided",
            Self::Routed => "routed",
        }
    }
}

impl fmt::Display for FlowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFlowStrategy(pub String);

impl FromStr for FlowStrategy {
    type Err = UnknownFlowStrategy;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "guided" => Ok(Self::Guided),
            "routed" => Ok(Self::Routed),
            other => Err(UnknownFlowStrategy(other.to_string())),
        }
    }
}

pub fn build_flow(
    strategy: FlowStrategy,
    steps: BookingSteps,
    llm: Arc<dyn LlmGateway>,
) -> Arc<dyn FlowDriver> {
    match strategy {
        FlowStrategy::Guided => Arc::new(GuidedFlow::new(steps)),
        FlowStrategy::Routed => Arc::new(RoutedFlow::new(steps, llm)),
    }
}
