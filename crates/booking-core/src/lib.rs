pub mod config;
mod config_env;
pub mod error;
pub mod extract;
pub mod flow;
pub mod llm;
pub mod matcher;
pub mod models;
pub mod orchestrator;
pub mod runs;
pub mod session;
pub mod tools;

pub use config::{ConfigError, OrchestratorConfig, ServerConfig, load_dotenv};
pub use error::TurnFailure;
pub use orchestrator::{Capabilities, SessionOrchestrator};
