use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::api::{create_router, AppState};
use chatrelay::citations::{MemorySlotStorage, SlotStorage};
use chatrelay::config::Config;
use chatrelay::db::{Database, DatabaseBackend, LibSqlBackend};
use chatrelay::upstream::HttpChatUpstream;

const REPLICA_SYNC_INTERVAL_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Streaming relay for retrieval-augmented chat APIs")]
struct Args {
    /// Bind address, overrides CHATRELAY_HOST
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides CHATRELAY_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatrelay=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if config.server.api_keys.is_empty() {
        tracing::warn!(
            "CHATRELAY_API_KEYS is not set, protected endpoints are locked. Set CHATRELAY_API_KEYS to enable /api/v1/chat."
        );
    }
    if config.upstream.api_key.is_none() && config.upstream.knowledge_bases.is_empty() {
        tracing::warn!("No upstream app keys configured, every chat turn will end with the fallback reply");
    }

    tracing::info!("Initializing database...");
    let raw_db = Database::new(&config.database).await?;
    let backend = Arc::new(LibSqlBackend::new(raw_db));

    tracing::info!("Upstream chat API: {}", config.upstream.base_url);
    let upstream = Arc::new(HttpChatUpstream::new(config.upstream.clone())?);

    let slots = Arc::new(MemorySlotStorage::new(config.citation_cache.max_slots));
    let state = AppState::new(config.clone(), backend, upstream, slots.clone());

    let cancel_token = CancellationToken::new();

    tracing::info!(
        "Starting citation slot purge... (interval={}s)",
        config.citation_cache.purge_interval_secs
    );
    let purge_interval = config.citation_cache.purge_interval_secs.max(1);
    let token = cancel_token.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Citation slot purge shutting down...");
                    break;
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(purge_interval)) => {
                    let purged = slots.purge_expired();
                    if purged > 0 {
                        tracing::info!(purged, "Purged expired citation slots");
                    }
                }
            }
        }
    });

    if config.database.local_path.is_some() {
        tracing::info!("Starting replica sync... (interval={}s)", REPLICA_SYNC_INTERVAL_SECS);
        let db: Arc<dyn DatabaseBackend> = state.db.clone();
        let token = cancel_token.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Replica sync shutting down...");
                        break;
                    }
                    _ = tokio::time::sleep(tokio::time::Duration::from_secs(REPLICA_SYNC_INTERVAL_SECS)) => {
                        if let Err(e) = db.sync().await {
                            tracing::error!("Replica sync error: {}", e);
                        }
                    }
                }
            }
        });
    }

    let chat = state.chat.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Chatrelay starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);
    tracing::info!("  API docs:     http://{}/api/v1/docs", addr);
    tracing::info!("  OpenAPI spec: http://{}/api/v1/openapi.json", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    chat.drain().await;
    tracing::info!("Chatrelay stopped");

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received, cancelling background tasks...");
    cancel_token.cancel();
}
