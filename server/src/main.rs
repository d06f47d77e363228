//! Stockroom Server binary.

use std::sync::Arc;
use stockroom_server::config::Config;
use stockroom_server::db::{MemoryRepository, PgRepository, Repository};
use stockroom_server::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockroom_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Stockroom Server on {}", config.bind_addr());

    let repo: Arc<dyn Repository> = match &config.database_url {
        Some(url) => Arc::new(PgRepository::connect(url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, keeping data in memory");
            Arc::new(MemoryRepository::new())
        }
    };

    let addr = config.bind_addr();
    let prefix = config.api_prefix.clone();
    let app = app(AppState::new(repo, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {} (API under {})", addr, prefix);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
