use serde_json::{Value, json};

use crate::matcher::OptionCandidate;
use crate::session::Session;

pub const ROUTER_SYSTEM_PROMPT: &str = "You route a salon booking conversation. \
Pick exactly one action for the next step and return JSON only: \
{\"action\": <action>, \"parameters\": {...}, \"message\": <short reply or null>}. \
Actions: fetch_locations, choose_location, create_cart, fetch_services, choose_service, \
add_service, fetch_dates, choose_date, fetch_times, choose_time, reserve_slot, fetch_staff, \
choose_staff, get_summary, confirm, clarify, fallback. \
Allowed parameters: locationId, locationName, serviceId, serviceName, date, time, staffId, staffName. \
Only use ids and names that appear in the supplied booking context or the user's words. \
Use clarify when the user's intent is unclear and fallback for questions that are not about \
choosing the next booking step.";

pub const CONVERSATION_SYSTEM_PROMPT: &str = "You are a friendly salon booking assistant. \
Answer briefly. Never invent locations, services, times, prices or confirmations. \
If the user wants to book, ask which location they would like.";

pub const RUN_INSTRUCTIONS_PREAMBLE: &str = "You help a customer book a salon appointment \
using the provided tools. Always pass the cart id from the booking state when a tool needs one. \
Treat the booking state as authoritative and never guess identifiers.";

/// System prompt for the routing model with the session's booking context
/// appended.
pub fn router_system_prompt(session: &Session) -> String {
    format!(
        "{ROUTER_SYSTEM_PROMPT}\n\nBooking context:\n{}",
        router_context(session)
    )
}

pub fn router_context(session: &Session) -> Value {
    json!({
        "step": session.step.as_str(),
        "booking": session.booking,
        "options": {
            "locations": option_names(session.options.locations.as_deref()),
            "services": option_names(session.options.services.as_deref()),
            "dates": option_names(session.options.dates.as_deref()),
            "times": option_names(session.options.times.as_deref()),
            "staff": option_names(session.options.staff.as_deref()),
        }
    })
}

/// Instructions for a run on the conversation thread, carrying the current
/// booking state.
pub fn run_instructions(session: &Session) -> String {
    let state = json!({
        "step": session.step.as_str(),
        "booking": session.booking,
    });
    format!("{RUN_INSTRUCTIONS_PREAMBLE}\n\nCurrent booking state:\n{state}")
}

fn option_names(options: Option<&[OptionCandidate]>) -> Value {
    match options {
        Some(options) => Value::Array(
            options
                .iter()
                .map(|option| json!({"id": option.id, "name": option.name}))
                .collect(),
        ),
        None => Value::Null,
    }
}
