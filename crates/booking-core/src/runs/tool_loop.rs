use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::backend::{PendingJob, RunBackend, RunBackendError, ToolOutputSubmission};
use super::poller::RunPoller;
use crate::extract::merge_envelope;
use crate::models::{AssistantReply, FrontendAction, FrontendActionKind};
use crate::session::Session;
use crate::tools::{ToolGateway, ToolName};

const PAYMENT_READY_MESSAGE: &str =
    "Your appointment is reserved. Use the payment button to finish checkout.";

#[derive(Debug, Clone)]
pub struct PaymentHandoff {
    pub tool_name: String,
    pub page_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    PaymentReady(AssistantReply),
    Settled(PendingJob),
}

/// Executes the tool calls a run asks for until it stops requiring action.
pub struct ToolCallLoop {
    gateway: ToolGateway,
    poller: RunPoller,
    max_iterations: u32,
    payment: PaymentHandoff,
}

impl ToolCallLoop {
    pub fn new(
        gateway: ToolGateway,
        poller: RunPoller,
        max_iterations: u32,
        payment: PaymentHandoff,
    ) -> Self {
        Self {
            gateway,
            poller,
            max_iterations,
            payment,
        }
    }

    pub async fn drive(
        &self,
        backend: &dyn RunBackend,
        session: &mut Session,
        job: PendingJob,
    ) -> Result<LoopOutcome, RunBackendError> {
        let mut job = job;
        let mut iterations = 0_u32;

        while job.requires_action() && iterations < self.max_iterations {
            iterations += 1;
            let mut outputs = Vec::with_capacity(job.required_tool_calls.len());

            for call in &job.required_tool_calls {
                let arguments = reconcile_cart_argument(
                    call.arguments.clone(),
                    session.booking.cart_id.as_deref(),
                    &call.name,
                );
                let envelope = self.gateway.invoke(&call.name, arguments).await;
                merge_envelope(&envelope, session);

                if call.name == self.payment.tool_name {
                    if envelope.is_error() {
                        warn!(
                            session_id = %session.id,
                            job_id = %job.id,
                            tool = %call.name,
                            "payment tool reported an error; handing off to the payment page anyway"
                        );
                    }
                    info!(
                        session_id = %session.id,
                        job_id = %job.id,
                        tool = %call.name,
                        iterations,
                        "payment tool observed; ending tool loop"
                    );
                    return Ok(LoopOutcome::PaymentReady(self.payment_reply(session)));
                }

                if ToolName::parse(&call.name) == Some(ToolName::CheckoutCart)
                    && !envelope.is_error()
                {
                    session.checkout_completed = true;
                }

                outputs.push(ToolOutputSubmission {
                    tool_call_id: call.id.clone(),
                    output: envelope.context_string(),
                });
            }

            job = backend
                .submit_tool_outputs(&job.thread_id, &job.id, outputs)
                .await?;
            job = self.poller.await_terminal(backend, job).await?;
        }

        if job.requires_action() {
            warn!(
                session_id = %session.id,
                job_id = %job.id,
                iterations,
                "tool loop reached its iteration ceiling"
            );
        }

        Ok(LoopOutcome::Settled(job))
    }

    fn payment_reply(&self, session: &Session) -> AssistantReply {
        let mut params = BTreeMap::new();
        if let Some(cart_id) = session.booking.cart_id.as_deref() {
            params.insert("cartId".to_string(), cart_id.to_string());
        }
        if let Some(amount) = session.booking.formatted_total() {
            params.insert("amount".to_string(), amount);
        }
        if let Some(email) = session.booking.client_email.as_deref() {
            params.insert("email".to_string(), email.to_string());
        }

        let url = match Url::parse_with_params(&self.payment.page_url, params.iter()) {
            Ok(url) => url.to_string(),
            Err(err) => {
                warn!(error = %err, "payment page url is invalid; sending it without parameters");
                self.payment.page_url.clone()
            }
        };

        AssistantReply::with_action(
            PAYMENT_READY_MESSAGE,
            FrontendAction {
                kind: FrontendActionKind::ShowPayButton,
                url,
                params,
            },
        )
    }
}

/// Rewrites every `cartId`/`cart_id` argument, at any depth, to the
/// session's cart once the session has one.
pub fn reconcile_cart_argument(arguments: Value, cart_id: Option<&str>, tool: &str) -> Value {
    let Some(cart_id) = cart_id else {
        return arguments;
    };
    reconcile_value(arguments, cart_id, tool)
}

fn reconcile_value(value: Value, cart_id: &str, tool: &str) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| {
                    if is_cart_key(&key) && !value.is_object() && !value.is_array() {
                        if value.as_str() != Some(cart_id) {
                            warn!(
                                tool,
                                argument = %key,
                                drifted = %value,
                                "corrected cart id argument to the session cart"
                            );
                        }
                        (key, Value::String(cart_id.to_string()))
                    } else {
                        let value = reconcile_value(value, cart_id, tool);
                        (key, value)
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| reconcile_value(item, cart_id, tool))
                .collect(),
        ),
        other => other,
    }
}

fn is_cart_key(key: &str) -> bool {
    key == "cartId" || key == "cart_id"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn drifted_cart_ids_are_corrected_at_any_depth() {
        let arguments = json!({
            "cartId": "cart-stale",
            "input": {"cart_id": 17, "items": [{"cartId": "cart-other", "itemId": "line-1"}]},
            "note": "cart-stale"
        });

        let reconciled = reconcile_cart_argument(arguments, Some("cart-live"), "assign_staff");

        assert_eq!(
            reconciled,
            json!({
                "cartId": "cart-live",
                "input": {"cart_id": "cart-live", "items": [{"cartId": "cart-live", "itemId": "line-1"}]},
                "note": "cart-stale"
            })
        );
    }

    #[test]
    fn arguments_pass_through_without_session_cart() {
        let arguments = json!({"cartId": "cart-from-model"});
        assert_eq!(
            reconcile_cart_argument(arguments.clone(), None, "get_cart_summary"),
            arguments
        );
    }
}
