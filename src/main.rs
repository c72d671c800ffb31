//! chatflow - declarative chat bot engine
//!
//! Routes conversational events to the handlers a YAML bot definition
//! declares, keeping each conversation's state and context consistent.

mod api;
mod bot;
mod config;
mod context;
mod db;
mod definition;
mod dispatcher;
mod event;
mod filters;
mod handlers;
mod platform;
mod runtime;
mod secrets;
mod state;

use api::{create_router, AppState};
use bot::Services;
use config::AppConfig;
use definition::{BotDefinition, ConfigurationError};
use platform::{FsAssets, LoggingChatApi};
use runtime::UpdateLoop;
use secrets::Secrets;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Inbound events buffered ahead of the update loop
const EVENT_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env();
    let definition_path = config
        .definition
        .clone()
        .ok_or("CHATFLOW_DEFINITION is not set")?;

    tracing::info!(path = %definition_path.display(), "Loading bot definition");
    let source = std::fs::read_to_string(&definition_path)?;
    if config.validate_only {
        validate_only(&source);
    }
    let definition = BotDefinition::from_yaml(&source)?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.as_deref().and_then(std::path::Path::parent) {
        std::fs::create_dir_all(parent)?;
    }
    let storage = bot::open_storage(&definition, config.db_path.as_deref(), config.bot_id)?;

    let secrets = Arc::new(Secrets::from_env());
    tracing::info!(count = secrets.len(), "Secrets loaded");

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let services = Services {
        api: Arc::new(LoggingChatApi),
        assets: Arc::new(FsAssets::new(&config.assets_root)),
        http,
        secrets,
        state: storage.state,
        context: storage.context,
        event_deadline: Some(config.event_deadline),
        api_deadline: Some(config.request_timeout),
    };
    let dispatcher = Arc::new(bot::build(&definition, &services)?);

    // Update loop
    let (events, source) = runtime::channel(EVENT_QUEUE);
    let cancel = CancellationToken::new();
    let update_loop = tokio::spawn(UpdateLoop::new(dispatcher.clone(), source, cancel.clone()).run());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(AppState::new(dispatcher, events)).layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("chatflow listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    update_loop.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Report definition problems and exit; non-zero when any were found
fn validate_only(source: &str) -> ! {
    match bot::check(source) {
        Ok(_) => {
            println!("Bot definition is valid");
            std::process::exit(0);
        }
        Err(ConfigurationError::Invalid(issues)) => {
            println!("There are validation errors:");
            for issue in issues {
                println!("  {issue}");
            }
        }
        Err(e) => println!("{e}"),
    }
    std::process::exit(1);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
