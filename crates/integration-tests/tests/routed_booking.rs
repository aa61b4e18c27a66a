mod support;

use booking_core::llm::ResponseFormat;
use booking_core::models::{ChatRole, FlowStep};
use booking_core::session::Session;
use serde_json::Value;

use support::stubs::{ScriptedLlm, ScriptedRuns, ScriptedTools};
use support::{Harness, locations_payload, routed_config};

fn routed_harness(tools: Vec<Value>, llm: Vec<&str>) -> Harness {
    Harness::new(
        routed_config(),
        ScriptedTools::new(tools),
        ScriptedRuns::default(),
        ScriptedLlm::new(llm),
    )
}

#[tokio::test]
async fn model_chosen_actions_run_against_live_options() {
    let harness = routed_harness(
        vec![locations_payload(), locations_payload()],
        vec![
            r#"{"action": "fetch_locations"}"#,
            r#"{"action": "choose_location", "parameters": {"locationName": "Sandbox"}}"#,
        ],
    );

    let first = harness.say("s-1", "I want to book something").await;
    assert_eq!(
        first.reply.content,
        "Which location would you like to book at?\n- Sandbox Location"
    );

    let second = harness.say("s-1", "the sandbox one").await;
    assert_eq!(second.reply.content, "Great, Sandbox Location it is.");
    assert_eq!(
        harness.tools.tool_names().await,
        vec!["list_locations", "list_locations"]
    );

    let requests = harness.llm.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(matches!(
        &requests[0].response_format,
        ResponseFormat::JsonSchema { name, .. } if name == "booking_flow_action"
    ));
    assert_eq!(requests[0].requester_id.as_deref(), Some("s-1"));

    let history = &requests[1].messages;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].content, "I want to book something");
    assert_eq!(history[1].role, ChatRole::Assistant);
    assert_eq!(history[2].content, "the sandbox one");

    let session = harness
        .session("s-1")
        .await
        .expect("session should be saved after the turn");
    assert_eq!(session.booking.location_id.as_deref(), Some("loc-1"));
}

#[tokio::test]
async fn unknown_model_id_is_rejected_with_a_reprompt() {
    let harness = routed_harness(
        vec![locations_payload()],
        vec![r#"{"action": "choose_location", "parameters": {"locationId": "loc-404"}}"#],
    );

    let response = harness.say("s-1", "book me somewhere nice").await;

    assert_eq!(
        response.reply.content,
        "Sorry, I couldn't match that to one of the options. Which location would you like to book at?\n- Sandbox Location"
    );
    let session = harness
        .session("s-1")
        .await
        .expect("session should be saved after the turn");
    assert!(session.booking.location_id.is_none());
}

#[tokio::test]
async fn malformed_routing_output_falls_back_to_plain_completion() {
    let harness = routed_harness(
        Vec::new(),
        vec!["I think you want a haircut", "Happy to help you book a haircut!"],
    );

    let response = harness.say("s-1", "haircut please").await;

    assert_eq!(response.reply.content, "Happy to help you book a haircut!");
    let requests = harness.llm.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].response_format, ResponseFormat::Text);
}

#[tokio::test]
async fn provider_outage_becomes_an_apology() {
    let harness = routed_harness(Vec::new(), Vec::new());

    let response = harness.say("s-1", "haircut please").await;

    assert_eq!(
        response.reply.content,
        "Sorry, I'm having trouble reaching the booking service right now. Please try again in a moment."
    );
}

#[tokio::test]
async fn confirm_before_summary_is_refused() {
    let harness = routed_harness(Vec::new(), vec![r#"{"action": "confirm"}"#]);
    let mut session = Session::new("s-1");
    session.step = FlowStep::TimeSelected;
    session.booking.cart_id = Some("cart-1".to_string());
    harness.seed(session).await;

    let response = harness.say("s-1", "just confirm it").await;

    assert_eq!(
        response.reply.content,
        "Let me put together your booking summary before confirming."
    );
    assert_eq!(harness.runs.started_runs(), 0);
    let session = harness
        .session("s-1")
        .await
        .expect("session should be saved after the turn");
    assert_eq!(session.step, FlowStep::TimeSelected);
    assert_eq!(session.booking.cart_id.as_deref(), Some("cart-1"));
}
