//! Outbound transports for rendered notifications.
//!
//! Every transport implements [`Output`]:
//! - `stdout`: prints messages, for debugging templates
//! - `mod_rest`: posts an XML envelope to ejabberd's mod_rest endpoint
//! - `xmpp`: a persistent client connection with optional room delivery

mod factory;
mod mod_rest;
mod stdout;
mod xmpp;

use async_trait::async_trait;
use thiserror::Error;

use crate::template::TemplateResult;

pub use factory::{create_output, xmpp_options};
pub use mod_rest::ModRestOutput;
pub use stdout::StdoutOutput;
pub use xmpp::{ChatConnector, ChatSession, Delivery, LinkState, XmppConnector, XmppOutput};

/// Errors returned by a transport write
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport could not recover and must not be used again
    #[error("Transport unusable: {0}")]
    Fatal(String),
}

impl OutputError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, OutputError::Fatal(_))
    }
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: String,
    /// Per-message recipient; `None` uses the transport's configured one
    pub destination: Option<String>,
}

impl OutgoingMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: Option<String>) -> Self {
        self.destination = destination;
        self
    }
}

/// A notification sink shared by all request handlers.
#[async_trait]
pub trait Output: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &'static str;

    /// Compute the recipient for this payload, if the transport routes per
    /// message.
    fn route(&self, _payload: &serde_json::Value) -> TemplateResult<Option<String>> {
        Ok(None)
    }

    /// Deliver `message`, returning the number of body bytes written.
    async fn write(&self, message: &OutgoingMessage) -> Result<usize, OutputError>;

    /// Release connections on shutdown.
    async fn close(&self) {}
}
