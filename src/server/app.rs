use axum::Router;
use tower_http::trace::TraceLayer;

use crate::webhook::webhook_routes;

use super::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(webhook_routes())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        // Add state
        .with_state(state)
}
