use std::sync::LazyLock;

use jsonschema::JSONSchema;
use serde_json::Value;
use thiserror::Error;

use super::contracts::{ContractError, FlowActionContract, flow_action_schema, parse_contract};

#[derive(Debug, Error)]
pub enum OutputValidationError {
    #[error("flow action output is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("flow action schema failed to compile: {0}")]
    SchemaCompile(String),
    #[error("flow action output failed schema validation: {0:?}")]
    SchemaViolation(Vec<String>),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

static FLOW_ACTION_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&flow_action_schema()).map_err(|err| err.to_string())
});

/// Parses raw model text into a flow action. Markdown code fences around the
/// JSON are tolerated.
pub fn parse_flow_action(raw: &str) -> Result<FlowActionContract, OutputValidationError> {
    let payload: Value = serde_json::from_str(strip_code_fence(raw))?;
    validate_flow_action_value(&payload)
}

pub fn validate_flow_action_value(
    payload: &Value,
) -> Result<FlowActionContract, OutputValidationError> {
    let validator = FLOW_ACTION_VALIDATOR
        .as_ref()
        .map_err(|message| OutputValidationError::SchemaCompile(message.clone()))?;

    if let Err(validation_errors) = validator.validate(payload) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(OutputValidationError::SchemaViolation(errors));
    }

    parse_contract(payload.clone()).map_err(OutputValidationError::from)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
