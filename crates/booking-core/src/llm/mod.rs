pub mod contracts;
pub mod gateway;
pub mod openai;
pub mod prompts;
pub mod safety;
pub mod validation;

pub use contracts::{
    ActionParameters, ContractError, FLOW_ACTION_SCHEMA_NAME, FlowAction, FlowActionContract,
    flow_action_schema,
};
pub use gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmTokenUsage, ResponseFormat,
};
pub use openai::{ChatCompletionsConfig, ChatCompletionsGateway, ChatModelRoute};
pub use safety::{collapse_whitespace, is_redacted, sanitize_untrusted_text};
pub use validation::{OutputValidationError, parse_flow_action, validate_flow_action_value};
