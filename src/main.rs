use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use chat_relay::adapters::ai::{GeminiConfig, GeminiProvider};
use chat_relay::adapters::http::{chat_router, ChatAppState};
use chat_relay::adapters::storage::InMemoryCheckpointStore;
use chat_relay::application::ChatEngine;
use chat_relay::config::{AppConfig, ValidationError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fail fast: nothing is bound until the configuration is complete.
    let config = match AppConfig::load_validated() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            std::process::exit(1);
        }
    };

    init_tracing(&config)?;

    let gemini = GeminiConfig::from_app_config(&config.ai)
        .ok_or(ValidationError::MissingRequired("CHAT_RELAY__AI__API_KEY"))?;
    let provider = GeminiProvider::new(gemini)?;

    let engine = ChatEngine::new(
        Arc::new(provider),
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .with_system_prompt(config.ai.system_prompt.clone())
    .with_temperature(config.ai.temperature);

    let state = ChatAppState::new(
        Arc::new(engine),
        config.chat.default_thread()?,
        config.chat.stream_delay(),
    );
    let router = chat_router(state, &config.server);

    let addr = config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        model = %config.ai.model,
        stream_delay_ms = config.chat.stream_delay_ms,
        "Chat relay listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Chat relay stopped");
    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` overrides `server.log_level`.
fn init_tracing(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
