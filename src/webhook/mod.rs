//! Webhook ingress: decode, render, route, deliver.

mod handler;
mod routes;

pub use handler::{decode_payload, receive_webhook, Payload};
pub use routes::webhook_routes;
