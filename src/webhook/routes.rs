use axum::{routing::any, Router};

use crate::server::AppState;

use super::handler::receive_webhook;

/// Every method on the root and on any path; the handler decides the status.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/", any(receive_webhook))
        .route("/{*path}", any(receive_webhook))
}
