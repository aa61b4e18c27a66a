mod assistants;
mod backend;
mod poller;
mod tool_loop;

pub use assistants::{AssistantsBackendConfig, AssistantsRunBackend};
pub use backend::{
    JobStatus, PendingJob, RequestedToolCall, RunBackend, RunBackendError, RunBackendFuture,
    ToolOutputSubmission,
};
pub use poller::RunPoller;
pub use tool_loop::{LoopOutcome, PaymentHandoff, ToolCallLoop, reconcile_cart_argument};
