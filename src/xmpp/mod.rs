//! Minimal XMPP client used by the persistent chat output.
//!
//! Covers what a notification bot needs and nothing more:
//! - TCP connect with direct TLS, opportunistic STARTTLS or plaintext
//! - SASL PLAIN authentication, resource binding and legacy sessions
//! - Initial presence, MUC join without history, `chat`/`groupchat` messages
//!
//! Inbound traffic after negotiation is read and discarded by a background
//! task so the server keeps the stream open.

mod client;
mod element;
mod stanza;
mod stream;

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use client::XmppClient;
pub use element::{Element, ElementReader, Parsed};
pub use stream::XmppStream;

/// XMPP client errors
#[derive(Debug, Error)]
pub enum XmppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Invalid JID: {0}")]
    InvalidJid(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Stream closed by server")]
    StreamClosed,

    #[error("Connection is not alive")]
    NotConnected,
}

pub type XmppResult<T> = Result<T, XmppError>;

/// Transport security for the client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// TLS from the first byte
    #[default]
    Tls,
    /// Upgrade with STARTTLS when the server offers it
    StartTls,
    /// Plaintext only
    None,
}

impl TlsMode {
    pub fn default_port(self) -> u16 {
        match self {
            TlsMode::Tls => 5223,
            TlsMode::StartTls | TlsMode::None => 5222,
        }
    }
}

/// Connection parameters
#[derive(Debug, Clone)]
pub struct XmppOptions {
    /// Server address, `host` or `host:port`
    pub host: String,
    /// Bare JID, `local@domain`
    pub user: String,
    pub password: String,
    pub resource: String,
    pub tls: TlsMode,
    /// Reject certificates that do not name the server
    pub verify_host: bool,
    /// Request a legacy session when the server requires one
    pub session: bool,
    pub status: String,
    pub status_message: Option<String>,
    /// Log raw XML at debug level
    pub debug: bool,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

/// Message semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one message
    Chat,
    /// Message to a joined room
    GroupChat,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Chat => "chat",
            ChatKind::GroupChat => "groupchat",
        }
    }
}

/// An outgoing chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub remote: String,
    pub kind: ChatKind,
    pub text: String,
}

/// `local@domain[/resource]` split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jid {
    pub local: String,
    pub domain: String,
}

impl Jid {
    pub fn parse(jid: &str) -> XmppResult<Self> {
        let bare = jid.split('/').next().unwrap_or_default();
        match bare.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Self {
                local: local.to_string(),
                domain: domain.to_string(),
            }),
            _ => Err(XmppError::InvalidJid(jid.to_string())),
        }
    }

    pub fn bare(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

/// Split `host[:port]` into a TLS server name and a port.
pub fn server_address(host: &str, tls: TlsMode) -> (String, u16) {
    let trimmed = host.trim();
    if let Some((name, port)) = trimmed.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            let name = name.trim_start_matches('[').trim_end_matches(']');
            return (name.to_string(), port);
        }
    }
    let name = trimmed.trim_start_matches('[').trim_end_matches(']');
    (name.to_string(), tls.default_port())
}
