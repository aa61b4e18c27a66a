use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Structured booking fields accumulated over a session.
///
/// `service_id` is the catalog service chosen by the user. `service_item_id`
/// is the cart line created when that service was attached to the cart; the
/// staff and checkout tools address the line, never the catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingState {
    pub location_id: Option<String>,
    pub location_name: Option<String>,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub service_item_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub bookable_time_id: Option<String>,
    pub staff_variant_id: Option<String>,
    pub staff_name: Option<String>,
    pub cart_id: Option<String>,
    pub promotion_offer_id: Option<String>,
    pub client_email: Option<String>,
    pub total_amount: Option<f64>,
}

impl BookingState {
    pub fn formatted_total(&self) -> Option<String> {
        self.total_amount.map(format_major_units)
    }

    /// Drops everything picked after the location so a new service choice
    /// starts from a clean slot selection.
    pub fn clear_selection(&mut self) {
        self.date = None;
        self.time = None;
        self.bookable_time_id = None;
        self.staff_variant_id = None;
        self.staff_name = None;
    }
}

pub fn minor_to_major(minor_units: f64) -> f64 {
    minor_units / 100.0
}

pub fn format_major_units(amount: f64) -> String {
    format!("{amount:.2}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStep {
    #[default]
    New,
    LocationPending,
    CartCreated,
    ServicePending,
    ServiceSelected,
    DatePending,
    DateSelected,
    TimePending,
    TimeSelected,
    StaffPending,
    StaffSelected,
    SummaryReady,
    Confirmed,
    Cancelled,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::LocationPending => "LOCATION_PENDING",
            Self::CartCreated => "CART_CREATED",
            Self::ServicePending => "SERVICE_PENDING",
            Self::ServiceSelected => "SERVICE_SELECTED",
            Self::DatePending => "DATE_PENDING",
            Self::DateSelected => "DATE_SELECTED",
            Self::TimePending => "TIME_PENDING",
            Self::TimeSelected => "TIME_SELECTED",
            Self::StaffPending => "STAFF_PENDING",
            Self::StaffSelected => "STAFF_SELECTED",
            Self::SummaryReady => "SUMMARY_READY",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrontendActionKind {
    ShowPayButton,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendAction {
    #[serde(rename = "type")]
    pub kind: FrontendActionKind,
    pub url: String,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_action: Option<FrontendAction>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            frontend_action: None,
        }
    }

    pub fn with_action(content: impl Into<String>, action: FrontendAction) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            frontend_action: Some(action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub reply: AssistantReply,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn minor_units_display_with_two_decimals() {
        for raw in [0_u64, 1, 5, 99, 100, 1005, 12_345, 999_999, 4_294_967_295] {
            let expected = format!("{}.{:02}", raw / 100, raw % 100);
            assert_eq!(
                format_major_units(minor_to_major(raw as f64)),
                expected,
                "raw minor units {raw}"
            );
        }
    }

    #[test]
    fn reply_serializes_frontend_action_with_type_tag() {
        let mut params = BTreeMap::new();
        params.insert("cartId".to_string(), "cart-1".to_string());
        let reply = AssistantReply::with_action(
            "ready",
            FrontendAction {
                kind: FrontendActionKind::ShowPayButton,
                url: "https://pay.example/checkout?cartId=cart-1".to_string(),
                params,
            },
        );

        let value = serde_json::to_value(&reply).expect("reply should serialize");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["frontendAction"]["type"], "SHOW_PAY_BUTTON");
        assert_eq!(value["frontendAction"]["params"]["cartId"], "cart-1");
    }

    #[test]
    fn plain_reply_omits_frontend_action() {
        let value =
            serde_json::to_value(AssistantReply::text("hello")).expect("reply should serialize");
        assert_eq!(value, json!({"role": "assistant", "content": "hello"}));
    }
}
