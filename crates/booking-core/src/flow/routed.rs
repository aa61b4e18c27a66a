use std::sync::Arc;

use tracing::{info, warn};

use super::intent::is_no_preference;
use super::steps::{
    BookingSteps, DATE_PROMPT, LOCATION_PROMPT, OptionSource, Prerequisite, SERVICE_PROMPT,
    STAFF_PROMPT, SlotReservation, StepError, TIME_PROMPT, reprompt,
};
use super::{CONFIRMED_INSTRUCTIONS, FlowDriver, FlowFuture, FlowOutcome, FlowStrategy};
use crate::error::TurnFailure;
use crate::llm::prompts::{CONVERSATION_SYSTEM_PROMPT, router_system_prompt};
use crate::llm::{
    FLOW_ACTION_SCHEMA_NAME, FlowAction, FlowActionContract, LlmGateway, LlmGatewayRequest,
    OutputValidationError, flow_action_schema, parse_flow_action, sanitize_untrusted_text,
};
use crate::matcher::MatchOutcome;
use crate::models::{ChatTurn, FlowStep};
use crate::session::Session;

const GREETING: &str = "Hi! I can help you book an appointment.";
const DEFAULT_CLARIFY: &str = "Could you tell me a bit more about what you'd like to book?";

/// Model-routed flow: a structured completion names the next action and the
/// flow runs exactly that action. Any id or name the model supplies is
/// checked against freshly fetched options before it is accepted.
pub struct RoutedFlow {
    steps: BookingSteps,
    llm: Arc<dyn LlmGateway>,
}

impl RoutedFlow {
    pub fn new(steps: BookingSteps, llm: Arc<dyn LlmGateway>) -> Self {
        Self { steps, llm }
    }

    async fn route(&self, session: &mut Session, message: &str) -> FlowOutcome {
        let mut messages = session.history.clone();
        messages.push(ChatTurn::user(sanitize_untrusted_text(message)));

        let request = LlmGatewayRequest::structured(
            router_system_prompt(session),
            messages.clone(),
            FLOW_ACTION_SCHEMA_NAME,
            flow_action_schema(),
        )
        .with_requester_id(&session.id);

        let response = match self.llm.generate(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "routing request failed");
                return FlowOutcome::Failed(TurnFailure::ExternalCallFailure(err.to_string()));
            }
        };

        let contract = match parse_flow_action(&response.content) {
            Ok(contract) => contract,
            Err(err) => {
                warn!(
                    session_id = %session.id,
                    model = %response.model,
                    error = %err,
                    "routing output was malformed; falling back to plain completion"
                );
                return self.plain_completion(session, messages, err).await;
            }
        };

        info!(
            session_id = %session.id,
            action = contract.action.as_str(),
            step = session.step.as_str(),
            "routing model chose action"
        );

        match self.execute(session, message, contract).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "routed action could not run");
                FlowOutcome::Reply(err.user_message().to_string())
            }
        }
    }

    async fn plain_completion(
        &self,
        session: &Session,
        messages: Vec<ChatTurn>,
        cause: OutputValidationError,
    ) -> FlowOutcome {
        let request = LlmGatewayRequest::text(CONVERSATION_SYSTEM_PROMPT, messages)
            .with_requester_id(&session.id);

        match self.llm.generate(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                FlowOutcome::Reply(response.content.trim().to_string())
            }
            Ok(_) => FlowOutcome::Failed(TurnFailure::MalformedModelOutput(format!(
                "{cause}; fallback completion was empty"
            ))),
            Err(err) => FlowOutcome::Failed(TurnFailure::MalformedModelOutput(format!(
                "{cause}; fallback completion failed: {err}"
            ))),
        }
    }

    async fn execute(
        &self,
        session: &mut Session,
        message: &str,
        contract: FlowActionContract,
    ) -> Result<FlowOutcome, StepError> {
        let parameters = &contract.parameters;
        let reply = match contract.action {
            FlowAction::FetchLocations => self.steps.location_prompt(session).await?,
            FlowAction::ChooseLocation => {
                let value = parameters.location_reference().unwrap_or(message);
                match self
                    .steps
                    .choose_location(session, Some(value), OptionSource::Live)
                    .await?
                {
                    MatchOutcome::Valid { name, .. } => format!("Great, {name} it is."),
                    MatchOutcome::Invalid { options } => reprompt(LOCATION_PROMPT, &options),
                }
            }
            FlowAction::CreateCart => {
                self.steps.create_cart(session).await?;
                format!(
                    "Your booking at {} is started. Which service would you like?",
                    session.booking.location_name.as_deref().unwrap_or("the salon")
                )
            }
            FlowAction::FetchServices => self.steps.service_prompt(session).await?,
            FlowAction::ChooseService => {
                let value = parameters.service_reference().unwrap_or(message);
                match self
                    .steps
                    .choose_service(session, Some(value), OptionSource::Live)
                    .await?
                {
                    MatchOutcome::Valid { name, .. } => format!("{name}, good choice."),
                    MatchOutcome::Invalid { options } => reprompt(SERVICE_PROMPT, &options),
                }
            }
            FlowAction::AddService => {
                self.steps.add_service(session).await?;
                format!(
                    "I've added {} to your booking.",
                    session.booking.service_name.as_deref().unwrap_or("the service")
                )
            }
            FlowAction::FetchDates => self.steps.date_prompt(session).await?,
            FlowAction::ChooseDate => {
                let value = parameters.date.as_deref().unwrap_or(message);
                match self
                    .steps
                    .choose_date(session, Some(value), OptionSource::Live)
                    .await?
                {
                    MatchOutcome::Valid { name, .. } => format!("{name} it is."),
                    MatchOutcome::Invalid { options } => reprompt(DATE_PROMPT, &options),
                }
            }
            FlowAction::FetchTimes => self.steps.time_prompt(session).await?,
            FlowAction::ChooseTime => {
                let value = parameters.time.as_deref().unwrap_or(message);
                match self
                    .steps
                    .choose_time(session, Some(value), OptionSource::Live)
                    .await?
                {
                    MatchOutcome::Valid { name, .. } => format!("{name} noted."),
                    MatchOutcome::Invalid { options } => reprompt(TIME_PROMPT, &options),
                }
            }
            FlowAction::ReserveSlot => match self.steps.reserve_slot(session).await? {
                SlotReservation::Reserved => format!(
                    "Your {} slot is reserved.",
                    session.booking.time.as_deref().unwrap_or("selected")
                ),
                SlotReservation::NeedsChoice { options } => reprompt(TIME_PROMPT, &options),
            },
            FlowAction::FetchStaff => self.steps.staff_prompt(session).await?,
            FlowAction::ChooseStaff => {
                if parameters.staff_reference().is_none() && is_no_preference(message) {
                    self.steps.skip_staff(session);
                    "No problem, the first available staff member will take care of you."
                        .to_string()
                } else {
                    let value = parameters.staff_reference().unwrap_or(message);
                    match self
                        .steps
                        .choose_staff(session, Some(value), OptionSource::Live)
                        .await?
                    {
                        MatchOutcome::Valid { name, .. } => {
                            self.steps.assign_staff(session).await?;
                            format!("{name} will take care of you.")
                        }
                        MatchOutcome::Invalid { options } => reprompt(STAFF_PROMPT, &options),
                    }
                }
            }
            FlowAction::GetSummary => self.steps.summary(session).await?,
            FlowAction::Confirm => {
                if session.step != FlowStep::SummaryReady {
                    return Err(StepError::MissingPrerequisite(Prerequisite::Summary));
                }
                session.step = FlowStep::Confirmed;
                info!(session_id = %session.id, "booking confirmed");
                return Ok(FlowOutcome::Handoff {
                    instructions: Some(CONFIRMED_INSTRUCTIONS.to_string()),
                });
            }
            FlowAction::Clarify => contract
                .message
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(DEFAULT_CLARIFY)
                .to_string(),
            FlowAction::Fallback => return Ok(FlowOutcome::Handoff { instructions: None }),
        };

        Ok(FlowOutcome::Reply(reply))
    }
}

impl FlowDriver for RoutedFlow {
    fn strategy(&self) -> FlowStrategy {
        FlowStrategy::Routed
    }

    fn start<'a>(&'a self, session: &'a mut Session) -> FlowFuture<'a> {
        Box::pin(async move {
            match self.steps.location_prompt(session).await {
                Ok(prompt) => FlowOutcome::Reply(format!("{GREETING} {prompt}")),
                Err(err) => FlowOutcome::Reply(err.user_message().to_string()),
            }
        })
    }

    fn advance<'a>(&'a self, session: &'a mut Session, message: &'a str) -> FlowFuture<'a> {
        Box::pin(async move { self.route(session, message).await })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::{Value, json};
    use tokio::sync::Mutex;

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::llm::{
        LlmGatewayError, LlmGatewayFuture, LlmGatewayResponse, ResponseFormat,
    };
    use crate::tools::{
        ToolExecutor, ToolExecutorError, ToolExecutorFuture, ToolGateway, ToolInvocation,
    };

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, LlmGatewayError>>>,
        requests: Mutex<Vec<LlmGatewayRequest>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String, LlmGatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from(replies)),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl LlmGateway for ScriptedLlm {
        fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
            Box::pin(async move {
                self.requests.lock().await.push(request);
                let content = self.replies.lock().await.pop_front().unwrap_or_else(|| {
                    Err(LlmGatewayError::ProviderFailure("script exhausted".to_string()))
                })?;
                Ok(LlmGatewayResponse {
                    model: "scripted".to_string(),
                    provider_request_id: None,
                    content,
                    usage: None,
                })
            })
        }
    }

    struct ScriptedExecutor {
        replies: Mutex<VecDeque<Value>>,
        calls: Mutex<Vec<ToolInvocation>>,
    }

    impl ScriptedExecutor {
        fn new(replies: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from(replies)),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ToolExecutor for ScriptedExecutor {
        fn execute<'a>(&'a self, invocation: ToolInvocation) -> ToolExecutorFuture<'a> {
            Box::pin(async move {
                self.calls.lock().await.push(invocation);
                self.replies
                    .lock()
                    .await
                    .pop_front()
                    .ok_or_else(|| ToolExecutorError::Transport("script exhausted".to_string()))
            })
        }
    }

    fn routed(llm: Arc<ScriptedLlm>, executor: Arc<ScriptedExecutor>) -> RoutedFlow {
        let steps = BookingSteps::new(ToolGateway::new(executor), &OrchestratorConfig::default());
        RoutedFlow::new(steps, llm)
    }

    #[tokio::test]
    async fn model_claimed_location_is_checked_against_live_options() {
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "action": "choose_location",
            "parameters": {"locationId": "loc-404", "locationName": "Uptown"}
        })
        .to_string())]);
        let executor = ScriptedExecutor::new(vec![json!({"locations": [
            {"id": "loc-1", "name": "Sandbox Location"}
        ]})]);
        let flow = routed(llm.clone(), executor.clone());
        let mut session = Session::new("s-1");

        let outcome = flow.advance(&mut session, "the uptown one").await;

        assert_eq!(
            outcome,
            FlowOutcome::Reply(format!(
                "Sorry, I couldn't match that to one of the options. {LOCATION_PROMPT}\n- Sandbox Location"
            ))
        );
        assert_eq!(session.booking.location_id, None);
        let requests = llm.requests.lock().await;
        assert!(matches!(
            requests[0].response_format,
            ResponseFormat::JsonSchema { ref name, .. } if name == FLOW_ACTION_SCHEMA_NAME
        ));
        assert_eq!(requests[0].messages.last().map(|turn| turn.content.as_str()), Some("the uptown one"));
    }

    #[tokio::test]
    async fn malformed_output_falls_back_to_plain_completion() {
        let llm = ScriptedLlm::new(vec![
            Ok("Sure, let me look that up!".to_string()),
            Ok("We are open from 9 to 5.".to_string()),
        ]);
        let flow = routed(llm.clone(), ScriptedExecutor::new(Vec::new()));
        let mut session = Session::new("s-1");

        let outcome = flow.advance(&mut session, "when are you open?").await;

        assert_eq!(outcome, FlowOutcome::Reply("We are open from 9 to 5.".to_string()));
        let requests = llm.requests.lock().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].response_format, ResponseFormat::Text);
    }

    #[tokio::test]
    async fn malformed_output_with_failed_fallback_is_a_turn_failure() {
        let llm = ScriptedLlm::new(vec![
            Ok("{\"action\": \"teleport\"}".to_string()),
            Err(LlmGatewayError::Timeout),
        ]);
        let flow = routed(llm, ScriptedExecutor::new(Vec::new()));
        let mut session = Session::new("s-1");

        let outcome = flow.advance(&mut session, "book me in").await;

        assert!(matches!(
            outcome,
            FlowOutcome::Failed(TurnFailure::MalformedModelOutput(_))
        ));
    }

    #[tokio::test]
    async fn services_before_cart_name_the_missing_step() {
        let llm = ScriptedLlm::new(vec![Ok(json!({"action": "fetch_services"}).to_string())]);
        let executor = ScriptedExecutor::new(Vec::new());
        let flow = routed(llm, executor.clone());
        let mut session = Session::new("s-1");

        let outcome = flow.advance(&mut session, "what services do you have?").await;

        assert_eq!(
            outcome,
            FlowOutcome::Reply(StepError::MissingPrerequisite(Prerequisite::Cart).user_message().to_string())
        );
        assert!(executor.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn confirm_requires_summary_and_hands_off() {
        let llm = ScriptedLlm::new(vec![
            Ok(json!({"action": "confirm"}).to_string()),
            Ok(json!({"action": "confirm"}).to_string()),
        ]);
        let flow = routed(llm, ScriptedExecutor::new(Vec::new()));
        let mut session = Session::new("s-1");

        let early = flow.advance(&mut session, "yes").await;
        assert_eq!(
            early,
            FlowOutcome::Reply(StepError::MissingPrerequisite(Prerequisite::Summary).user_message().to_string())
        );

        session.step = FlowStep::SummaryReady;
        let confirmed = flow.advance(&mut session, "yes").await;
        assert_eq!(
            confirmed,
            FlowOutcome::Handoff {
                instructions: Some(CONFIRMED_INSTRUCTIONS.to_string())
            }
        );
        assert_eq!(session.step, FlowStep::Confirmed);
    }

    #[tokio::test]
    async fn routing_failure_is_an_external_call_failure() {
        let llm = ScriptedLlm::new(vec![Err(LlmGatewayError::Timeout)]);
        let flow = routed(llm, ScriptedExecutor::new(Vec::new()));
        let mut session = Session::new("s-1");

        let outcome = flow.advance(&mut session, "book a facial").await;

        assert!(matches!(
            outcome,
            FlowOutcome::Failed(TurnFailure::ExternalCallFailure(_))
        ));
    }
}
