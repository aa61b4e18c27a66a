use thiserror::Error;

/// Failures that end a turn early. Each one still produces a reply; none of
/// them escape the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnFailure {
    #[error("external call failed: {0}")]
    ExternalCallFailure(String),
    #[error("model output could not be used: {0}")]
    MalformedModelOutput(String),
    #[error("run did not settle after {attempts} polls")]
    PollExhaustion { attempts: u32 },
    #[error("tool loop still required action after {iterations} iterations")]
    LoopExhaustion { iterations: u32 },
    #[error("run ended with status {status}")]
    RunFailed { status: String },
}

impl TurnFailure {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ExternalCallFailure(_) => {
                "Sorry, I'm having trouble reaching the booking service right now. Please try again in a moment."
            }
            Self::MalformedModelOutput(_) => {
                "Sorry, I didn't quite get that. Could you rephrase what you'd like to book?"
            }
            Self::PollExhaustion { .. } | Self::LoopExhaustion { .. } => {
                "I couldn't finish that request right now. Please try again later."
            }
            Self::RunFailed { .. } => {
                "Sorry, something went wrong while working on your booking. Please try again."
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExternalCallFailure(_) => "external_call_failure",
            Self::MalformedModelOutput(_) => "malformed_model_output",
            Self::PollExhaustion { .. } => "poll_exhaustion",
            Self::LoopExhaustion { .. } => "loop_exhaustion",
            Self::RunFailed { .. } => "run_failed",
        }
    }
}
