use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_warden::chat::CardClient;
use merge_warden::clock::{Clock, SystemClock};
use merge_warden::config::{Config, Secrets};
use merge_warden::engine::{Collaborators, Engine};
use merge_warden::host::OctocrabConnector;
use merge_warden::server::{AppState, build_router};
use merge_warden::store::{FileStore, KvStore};
use merge_warden::tracker::JiraClient;
use merge_warden::worker::{PollConfig, Runner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merge_warden=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let secrets = Secrets::from_env().context("reading secrets")?;
    if secrets.command_secret.is_none() {
        tracing::warn!("MERGE_WARDEN_COMMAND_SECRET is not set, command endpoints are disabled");
    }

    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("creating state directory {}", config.state_dir.display()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn KvStore> = Arc::new(
        FileStore::open_with_clock(config.store_path(), Arc::clone(&clock)).context("opening store")?,
    );

    let collaborators = Collaborators {
        host: OctocrabConnector::from_token(secrets.github_token.clone()).context("building GitHub client")?,
        tracker: JiraClient::new(
            config.tracker.base_url.clone(),
            config.tracker.user.clone(),
            secrets.tracker_token.clone(),
        ),
        chat: CardClient::new(config.chat.base_url.clone(), secrets.chat_token.clone()),
    };
    let git = config.git_config(Some(&secrets.github_token));
    let listen_addr = config.listen_addr.clone();
    let engine = Engine::new(config, collaborators, store, clock, git).context("restoring task queue")?;

    let shutdown = CancellationToken::new();
    let runner = tokio::spawn(Runner::new(engine.clone(), PollConfig::from_env()).run(shutdown.clone()));

    let app = build_router(AppState::new(engine, secrets.command_secret));
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    tracing::info!("listening on {}", listen_addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await
        .context("serving HTTP")?;

    shutdown.cancel();
    runner.await.context("runner task")?;
    Ok(())
}
