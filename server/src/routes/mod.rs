//! HTTP route definitions.

mod containers;
mod health;
mod items;

use crate::AppState;
use axum::Router;

/// Create all application routes, mounting the REST resources under `api_prefix`.
pub fn create_routes(api_prefix: &str) -> Router<AppState> {
    let api = Router::new()
        .merge(containers::routes())
        .merge(items::routes());

    let router = Router::new().merge(health::routes());
    if api_prefix == "/" {
        router.merge(api)
    } else {
        router.nest(api_prefix, api)
    }
}
