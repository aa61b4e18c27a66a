mod support;

use booking_core::models::{BookingState, ChatRole, FlowStep};
use booking_core::session::Session;
use serde_json::json;

use support::stubs::ScriptedRuns;
use support::{Harness, create_cart_payload, locations_payload, services_payload};

#[tokio::test]
async fn booking_request_lists_locations() {
    let harness = Harness::guided(vec![locations_payload()], ScriptedRuns::default());

    let response = harness.say("s-a", "book a facial").await;

    assert_eq!(response.reply.role, ChatRole::Assistant);
    assert_eq!(
        response.reply.content,
        "Which location would you like to book at?\n- Sandbox Location"
    );
    assert!(response.reply.frontend_action.is_none());
    assert_eq!(harness.tools.tool_names().await, vec!["list_locations"]);

    let session = harness
        .session("s-a")
        .await
        .expect("session should be saved after the turn");
    assert_eq!(session.step, FlowStep::LocationPending);
    assert_eq!(session.service_hint.as_deref(), Some("facial"));
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.history[0].content, "book a facial");
    assert_eq!(harness.runs.started_runs(), 0);
}

#[tokio::test]
async fn location_choice_creates_cart_and_lists_services() {
    let harness = Harness::guided(
        vec![locations_payload(), create_cart_payload(), services_payload()],
        ScriptedRuns::default(),
    );

    harness.say("s-b", "I'd like to make an appointment").await;
    let response = harness.say("s-b", "Sandbox").await;

    assert_eq!(
        response.reply.content,
        "Great, Sandbox Location it is. Which service would you like?\n- Haircut\n- Signature Facial"
    );

    let calls = harness.tools.calls().await;
    let names = calls
        .iter()
        .map(|call| call.tool_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["list_locations", "create_cart", "list_services"]);
    assert_eq!(calls[1].arguments, json!({"locationId": "loc-1"}));
    assert_eq!(calls[2].arguments, json!({"cartId": "cart-1"}));

    let session = harness
        .session("s-b")
        .await
        .expect("session should be saved after the turn");
    assert_eq!(session.step, FlowStep::ServicePending);
    assert_eq!(session.booking.location_id.as_deref(), Some("loc-1"));
    assert_eq!(session.booking.cart_id.as_deref(), Some("cart-1"));
    assert_eq!(session.history.len(), 4);
}

#[tokio::test]
async fn unmatched_location_reprompts_with_the_same_options() {
    let harness = Harness::guided(vec![locations_payload()], ScriptedRuns::default());

    harness.say("s-1", "book a massage").await;
    let response = harness.say("s-1", "Downtown").await;

    assert_eq!(
        response.reply.content,
        "Sorry, I couldn't match that to one of the options. Which location would you like to book at?\n- Sandbox Location"
    );
    assert_eq!(harness.tools.tool_names().await, vec!["list_locations"]);

    let session = harness
        .session("s-1")
        .await
        .expect("session should be saved after the turn");
    assert_eq!(session.step, FlowStep::LocationPending);
    assert!(session.booking.cart_id.is_none());
}

#[tokio::test]
async fn greeting_resets_an_in_progress_booking() {
    let harness = Harness::guided(vec![locations_payload()], ScriptedRuns::default());

    let mut session = Session::new("s-e");
    session.step = FlowStep::ServicePending;
    session.booking = BookingState {
        location_id: Some("loc-9".to_string()),
        location_name: Some("Old Town".to_string()),
        cart_id: Some("cart-9".to_string()),
        ..BookingState::default()
    };
    session.thread.thread_id = Some("thread-old".to_string());
    session.thread.message_count = 6;
    harness.seed(session).await;

    let response = harness.say("s-e", "Hi!").await;

    assert_eq!(
        response.reply.content,
        "Hi! I can help you book an appointment. Which location would you like to book at?\n- Sandbox Location"
    );

    let session = harness
        .session("s-e")
        .await
        .expect("session should be saved after the reset");
    assert_eq!(session.step, FlowStep::LocationPending);
    assert!(session.booking.cart_id.is_none());
    assert!(session.booking.location_id.is_none());
    assert!(session.thread.thread_id.is_none());
    assert_eq!(session.history.len(), 2);
}

#[tokio::test]
async fn declining_the_summary_cancels_without_calling_the_assistant() {
    let harness = Harness::guided(Vec::new(), ScriptedRuns::default());

    let mut session = Session::new("s-1");
    session.step = FlowStep::SummaryReady;
    session.booking.cart_id = Some("cart-1".to_string());
    harness.seed(session).await;

    let response = harness.say("s-1", "no thanks").await;

    assert!(response.reply.content.starts_with("No problem, I've cancelled that booking."));
    let session = harness
        .session("s-1")
        .await
        .expect("session should be saved after the turn");
    assert_eq!(session.step, FlowStep::Cancelled);
    assert_eq!(session.booking, BookingState::default());
    assert_eq!(harness.runs.started_runs(), 0);
    assert!(harness.tools.calls().await.is_empty());
}

#[tokio::test]
async fn tool_failure_becomes_a_corrective_reply() {
    let harness = Harness::guided(
        vec![json!({"isError": true, "content": [{"type": "text", "text": "upstream timeout"}]})],
        ScriptedRuns::default(),
    );

    let response = harness.say("s-1", "I want to book a haircut").await;

    assert_eq!(
        response.reply.content,
        "I couldn't reach the booking system just now. Please try again."
    );
    assert!(response.reply.frontend_action.is_none());
}

#[tokio::test]
async fn blank_message_is_answered_without_touching_the_session() {
    let harness = Harness::guided(Vec::new(), ScriptedRuns::default());

    let response = harness.say("s-1", "   \n\t ").await;

    assert_eq!(
        response.reply.content,
        "I didn't catch that. What would you like to book?"
    );
    assert!(harness.session("s-1").await.is_none());
}
