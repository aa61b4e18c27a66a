use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const FLOW_ACTION_SCHEMA_NAME: &str = "booking_flow_action";

/// The closed set of steps a routing model may ask the booking flow to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    FetchLocations,
    ChooseLocation,
    CreateCart,
    FetchServices,
    ChooseService,
    AddService,
    FetchDates,
    ChooseDate,
    FetchTimes,
    ChooseTime,
    ReserveSlot,
    FetchStaff,
    ChooseStaff,
    GetSummary,
    Confirm,
    Clarify,
    Fallback,
}

impl FlowAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchLocations => "fetch_locations",
            Self::ChooseLocation => "choose_location",
            Self::CreateCart => "create_cart",
            Self::FetchServices => "fetch_services",
            Self::ChooseService => "choose_service",
            Self::AddService => "add_service",
            Self::FetchDates => "fetch_dates",
            Self::ChooseDate => "choose_date",
            Self::FetchTimes => "fetch_times",
            Self::ChooseTime => "choose_time",
            Self::ReserveSlot => "reserve_slot",
            Self::FetchStaff => "fetch_staff",
            Self::ChooseStaff => "choose_staff",
            Self::GetSummary => "get_summary",
            Self::Confirm => "confirm",
            Self::Clarify => "clarify",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionParameters {
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub staff_name: Option<String>,
}

impl ActionParameters {
    /// The id if present, otherwise the name, as the value to match.
    pub fn location_reference(&self) -> Option<&str> {
        first_present(&self.location_id, &self.location_name)
    }

    pub fn service_reference(&self) -> Option<&str> {
        first_present(&self.service_id, &self.service_name)
    }

    pub fn staff_reference(&self) -> Option<&str> {
        first_present(&self.staff_id, &self.staff_name)
    }
}

fn first_present<'a>(id: &'a Option<String>, name: &'a Option<String>) -> Option<&'a str> {
    id.as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| name.as_deref().map(str::trim).filter(|value| !value.is_empty()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FlowActionContract {
    pub action: FlowAction,
    #[serde(default)]
    pub parameters: ActionParameters,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("flow action payload is invalid: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub fn flow_action_schema() -> Value {
    serde_json::to_value(schema_for!(FlowActionContract))
        .expect("flow action schema should be serializable")
}

pub fn parse_contract(payload: Value) -> Result<FlowActionContract, ContractError> {
    serde_json::from_value(payload).map_err(ContractError::from)
}
