use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confessions_bot::bot::{Chatbot, Persona};
use confessions_bot::config::Config;
use confessions_bot::persistence::SnapshotStore;
use confessions_bot::platform::GraphClient;
use confessions_bot::server::{AppState, build_router};
use confessions_bot::worker::{Dispatcher, DispatcherConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confessions_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env().context("loading configuration")?);
    tracing::info!(?config, "Loaded configuration");

    let platform = Arc::new(GraphClient::new(&config).context("building platform client")?);
    let store = Arc::new(match &config.state_path {
        Some(path) => SnapshotStore::open(path)
            .with_context(|| format!("opening state at {}", path.display()))?,
        None => {
            tracing::warn!("STATE_PATH not set, state will not survive a restart");
            SnapshotStore::in_memory()
        }
    });

    let bot = Arc::new(Chatbot::new(
        platform,
        store,
        Arc::clone(&config),
        Persona::moderator(),
    ));
    let shutdown = CancellationToken::new();
    let dispatcher = Arc::new(Dispatcher::start_with_shutdown(
        Arc::clone(&bot),
        DispatcherConfig::from_config(&config),
        shutdown.clone(),
    ));

    let app = build_router(AppState::new(
        Arc::clone(&config),
        bot,
        Arc::clone(&dispatcher),
    ));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!("listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("serving HTTP")?;

    dispatcher.shutdown().await;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}
