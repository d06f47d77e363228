//! Stockroom Server - the authoritative remote store for Stockroom replicas.
//!
//! Serves containers and items over REST in the wire format the replication
//! engine speaks (`_id`, `qty`, `selling_price`, `container_id`). Data lives in
//! PostgreSQL when `DATABASE_URL` is set and in memory otherwise.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;

use crate::config::Config;
use crate::db::Repository;
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, config: Config) -> Self {
        Self {
            repo,
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes(&state.config.api_prefix))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
