use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use booking_core::llm::{ChatCompletionsConfig, ChatCompletionsGateway};
use booking_core::runs::{AssistantsBackendConfig, AssistantsRunBackend};
use booking_core::session::InMemorySessionStore;
use booking_core::tools::{HttpToolExecutor, HttpToolExecutorConfig};
use booking_core::{
    Capabilities, ConfigError, OrchestratorConfig, ServerConfig, SessionOrchestrator, load_dotenv,
};
use booking_server::{AppState, build_router};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "booking_server=info,booking_core=info,axum=info".to_string()
        }))
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .init();

    let server_config = exit_on_config_error("server", ServerConfig::from_env());
    let orchestrator_config = exit_on_config_error("orchestrator", OrchestratorConfig::from_env());

    let tools = exit_on_config_error(
        "tool executor",
        HttpToolExecutorConfig::from_env().and_then(HttpToolExecutor::new),
    );
    let llm = exit_on_config_error(
        "chat completions",
        ChatCompletionsConfig::from_env().and_then(ChatCompletionsGateway::new),
    );
    let runs = exit_on_config_error(
        "run backend",
        AssistantsBackendConfig::from_env().and_then(AssistantsRunBackend::new),
    );

    let orchestrator = Arc::new(SessionOrchestrator::new(
        &orchestrator_config,
        Capabilities {
            tools: Arc::new(tools),
            llm: Arc::new(llm),
            runs: Arc::new(runs),
            store: Arc::new(InMemorySessionStore::new()),
        },
    ));
    let flow_strategy = orchestrator.flow_strategy();
    let _pruner = orchestrator.spawn_pruner(Duration::from_secs(
        orchestrator_config.session_prune_interval_secs,
    ));

    let app = build_router(AppState { orchestrator });

    let addr: SocketAddr = match server_config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, bind_addr = %server_config.bind_addr, "invalid bind addr");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, bind_addr = %addr, "failed to bind booking server listener");
            std::process::exit(1);
        }
    };

    info!(
        bind_addr = %listener.local_addr().unwrap_or(addr),
        flow_strategy = flow_strategy.as_str(),
        "booking server listening"
    );

    let shutdown = async {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
    };

    if let Err(err) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %err, "booking server failed");
        std::process::exit(1);
    }
}

fn exit_on_config_error<T>(component: &str, result: Result<T, ConfigError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!(component, error = %err, "failed to load config");
            std::process::exit(1);
        }
    }
}
