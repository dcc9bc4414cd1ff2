// Shared components
pub mod config;
pub mod error;
pub mod telemetry;

// Rendering and delivery
pub mod output;
pub mod template;
pub mod xmpp;

// Application layer
pub mod server;
pub mod webhook;

// Supporting modules
pub mod shutdown;
