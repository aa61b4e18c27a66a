use thiserror::Error;

use crate::config_env::{
    EnvLookup, optional_trimmed_env, parse_bool_env, parse_u32_env, parse_u64_env, process_env,
    require_http_url,
};
use crate::flow::FlowStrategy;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;
const DEFAULT_TOOL_LOOP_MAX_ITERATIONS: u32 = 5;
const DEFAULT_THREAD_MESSAGE_CEILING: u32 = 20;
const DEFAULT_HISTORY_MAX_TURNS: u32 = 40;
const DEFAULT_TIME_TOLERANCE_MINUTES: u32 = 30;
const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 3_600;
const DEFAULT_SESSION_PRUNE_INTERVAL_SECS: u64 = 300;
const DEFAULT_PAYMENT_TOOL_NAME: &str = "prepare_payment";
const DEFAULT_PAYMENT_PAGE_URL: &str = "http://localhost:3000/checkout";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid boolean in env var {0}")]
    ParseBool(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub flow_strategy: FlowStrategy,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub tool_loop_max_iterations: u32,
    pub thread_message_ceiling: u32,
    pub history_max_turns: usize,
    /// Sessions untouched for this long are dropped by the pruner.
    pub session_idle_ttl_secs: u64,
    pub session_prune_interval_secs: u64,
    pub time_tolerance_minutes: u32,
    /// Accept a free-text time without validation when no slot list is
    /// cached for the session.
    pub accept_unlisted_time: bool,
    pub offer_staff_choice: bool,
    pub payment_tool_name: String,
    pub payment_page_url: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            flow_strategy: FlowStrategy::Guided,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            tool_loop_max_iterations: DEFAULT_TOOL_LOOP_MAX_ITERATIONS,
            thread_message_ceiling: DEFAULT_THREAD_MESSAGE_CEILING,
            history_max_turns: DEFAULT_HISTORY_MAX_TURNS as usize,
            session_idle_ttl_secs: DEFAULT_SESSION_IDLE_TTL_SECS,
            session_prune_interval_secs: DEFAULT_SESSION_PRUNE_INTERVAL_SECS,
            time_tolerance_minutes: DEFAULT_TIME_TOLERANCE_MINUTES,
            accept_unlisted_time: true,
            offer_staff_choice: true,
            payment_tool_name: DEFAULT_PAYMENT_TOOL_NAME.to_string(),
            payment_page_url: DEFAULT_PAYMENT_PAGE_URL.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let flow_strategy = match optional_trimmed_env(lookup, "BOOKING_FLOW_STRATEGY") {
            Some(raw) => raw.parse::<FlowStrategy>().map_err(|_| {
                ConfigError::InvalidConfiguration(format!(
                    "BOOKING_FLOW_STRATEGY must be guided or routed, got '{raw}'"
                ))
            })?,
            None => FlowStrategy::Guided,
        };

        let config = Self {
            flow_strategy,
            poll_interval_ms: parse_u64_env(
                lookup,
                "RUN_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?,
            poll_max_attempts: parse_u32_env(
                lookup,
                "RUN_POLL_MAX_ATTEMPTS",
                DEFAULT_POLL_MAX_ATTEMPTS,
            )?,
            tool_loop_max_iterations: parse_u32_env(
                lookup,
                "TOOL_LOOP_MAX_ITERATIONS",
                DEFAULT_TOOL_LOOP_MAX_ITERATIONS,
            )?,
            thread_message_ceiling: parse_u32_env(
                lookup,
                "THREAD_MESSAGE_CEILING",
                DEFAULT_THREAD_MESSAGE_CEILING,
            )?,
            history_max_turns: parse_u32_env(
                lookup,
                "SESSION_HISTORY_MAX_TURNS",
                DEFAULT_HISTORY_MAX_TURNS,
            )? as usize,
            session_idle_ttl_secs: parse_u64_env(
                lookup,
                "SESSION_IDLE_TTL_SECS",
                DEFAULT_SESSION_IDLE_TTL_SECS,
            )?,
            session_prune_interval_secs: parse_u64_env(
                lookup,
                "SESSION_PRUNE_INTERVAL_SECS",
                DEFAULT_SESSION_PRUNE_INTERVAL_SECS,
            )?,
            time_tolerance_minutes: parse_u32_env(
                lookup,
                "TIME_MATCH_TOLERANCE_MINUTES",
                DEFAULT_TIME_TOLERANCE_MINUTES,
            )?,
            accept_unlisted_time: parse_bool_env(lookup, "ACCEPT_UNLISTED_TIME", true)?,
            offer_staff_choice: parse_bool_env(lookup, "OFFER_STAFF_CHOICE", true)?,
            payment_tool_name: optional_trimmed_env(lookup, "PAYMENT_TOOL_NAME")
                .unwrap_or_else(|| DEFAULT_PAYMENT_TOOL_NAME.to_string()),
            payment_page_url: require_http_url(
                "PAYMENT_PAGE_URL",
                optional_trimmed_env(lookup, "PAYMENT_PAGE_URL")
                    .unwrap_or_else(|| DEFAULT_PAYMENT_PAGE_URL.to_string()),
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_max_attempts == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "RUN_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.tool_loop_max_iterations == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "TOOL_LOOP_MAX_ITERATIONS must be at least 1".to_string(),
            ));
        }
        if self.thread_message_ceiling < 2 {
            return Err(ConfigError::InvalidConfiguration(
                "THREAD_MESSAGE_CEILING must be at least 2".to_string(),
            ));
        }
        if self.history_max_turns == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "SESSION_HISTORY_MAX_TURNS must be at least 1".to_string(),
            ));
        }
        if self.session_idle_ttl_secs == 0 || self.session_prune_interval_secs == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "SESSION_IDLE_TTL_SECS and SESSION_PRUNE_INTERVAL_SECS must be at least 1"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: optional_trimmed_env(lookup, "BOOKING_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}
