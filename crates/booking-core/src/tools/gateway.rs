use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, warn};

use super::catalog::ToolName;
use super::envelope::unwrap_payload;
use super::executor::{ToolExecutor, ToolInvocation};
use super::minimize::ToolOutput;

/// Result of one tool invocation. Tool failures are values here, never
/// errors, so a turn can always answer the user.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEnvelope {
    Ok {
        tool: String,
        payload: Value,
        output: ToolOutput,
    },
    Error {
        tool: String,
        message: String,
    },
}

impl ToolEnvelope {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::Ok { tool, .. } | Self::Error { tool, .. } => tool,
        }
    }

    pub fn output(&self) -> Option<&ToolOutput> {
        match self {
            Self::Ok { output, .. } => Some(output),
            Self::Error { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Ok { payload, .. } => Some(payload),
            Self::Error { .. } => None,
        }
    }

    pub fn to_context_value(&self) -> Value {
        match self {
            Self::Ok { output, .. } => serde_json::to_value(output)
                .unwrap_or_else(|_| json!({"error": true, "message": "unserializable output"})),
            Self::Error { message, .. } => json!({"error": true, "message": message}),
        }
    }

    pub fn context_string(&self) -> String {
        self.to_context_value().to_string()
    }
}

#[derive(Clone)]
pub struct ToolGateway {
    executor: Arc<dyn ToolExecutor>,
}

impl ToolGateway {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    pub async fn call(&self, tool: ToolName, arguments: Value) -> ToolEnvelope {
        self.invoke(tool.as_str(), arguments).await
    }

    pub async fn invoke(&self, tool_name: &str, arguments: Value) -> ToolEnvelope {
        let started = Instant::now();
        let result = self
            .executor
            .execute(ToolInvocation {
                tool_name: tool_name.to_string(),
                arguments,
            })
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result
            .map_err(|err| err.to_string())
            .and_then(unwrap_payload)
        {
            Ok(payload) => {
                let output = ToolOutput::decode(ToolName::parse(tool_name), &payload);
                debug!(tool = tool_name, latency_ms, outcome = "ok", "tool call completed");
                ToolEnvelope::Ok {
                    tool: tool_name.to_string(),
                    payload,
                    output,
                }
            }
            Err(message) => {
                warn!(
                    tool = tool_name,
                    latency_ms,
                    outcome = "error",
                    error = %message,
                    "tool call failed"
                );
                ToolEnvelope::Error {
                    tool: tool_name.to_string(),
                    message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use tokio::sync::Mutex;

    use super::*;
    use crate::tools::executor::{ToolExecutorError, ToolExecutorFuture};

    struct ScriptedExecutor {
        replies: Mutex<VecDeque<Result<Value, ToolExecutorError>>>,
        seen: Mutex<Vec<ToolInvocation>>,
    }

    impl ScriptedExecutor {
        fn new(replies: Vec<Result<Value, ToolExecutorError>>) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from(replies)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ToolExecutor for ScriptedExecutor {
        fn execute<'a>(&'a self, invocation: ToolInvocation) -> ToolExecutorFuture<'a> {
            Box::pin(async move {
                self.seen.lock().await.push(invocation);
                self.replies
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or(Err(ToolExecutorError::Transport("script exhausted".to_string())))
            })
        }
    }

    #[tokio::test]
    async fn unwraps_text_envelope_and_minimizes() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(json!({
            "content": [{"type": "text", "text": "{\"locations\":[{\"id\":\"loc-1\",\"name\":\"Sandbox Location\",\"phone\":\"555\"}]}"}]
        }))]));
        let gateway = ToolGateway::new(executor.clone());

        let envelope = gateway.call(ToolName::ListLocations, json!({})).await;

        assert!(!envelope.is_error());
        assert_eq!(
            envelope.to_context_value(),
            json!({"kind": "locations", "locations": [{"id": "loc-1", "name": "Sandbox Location"}]})
        );
        assert_eq!(
            envelope.payload().expect("payload should be kept")["locations"][0]["phone"],
            "555"
        );
        assert_eq!(executor.seen.lock().await[0].tool_name, "list_locations");
    }

    #[tokio::test]
    async fn executor_failure_becomes_error_envelope() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Err(ToolExecutorError::Timeout)]));
        let gateway = ToolGateway::new(executor);

        let envelope = gateway
            .invoke("create_cart", json!({"locationId": "loc-1"}))
            .await;

        assert!(envelope.is_error());
        assert_eq!(envelope.tool(), "create_cart");
        assert_eq!(
            envelope.to_context_value(),
            json!({"error": true, "message": "tool server request timed out"})
        );
    }

    #[tokio::test]
    async fn error_flagged_envelope_is_an_error() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(json!({
            "isError": true,
            "content": [{"type": "text", "text": "cart not found"}]
        }))]));
        let gateway = ToolGateway::new(executor);

        let envelope = gateway.invoke("add_service", json!({"cartId": "c"})).await;
        assert!(matches!(envelope, ToolEnvelope::Error { ref message, .. } if message == "cart not found"));
    }
}
