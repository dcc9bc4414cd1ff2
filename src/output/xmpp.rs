//! Persistent XMPP output with reconnect-on-failure

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use super::{OutgoingMessage, Output, OutputError};
use crate::template::{DestinationTemplate, TemplateResult};
use crate::xmpp::{Chat, ChatKind, XmppClient, XmppOptions, XmppResult};

/// An established chat session
#[async_trait]
pub trait ChatSession: Send {
    async fn send(&mut self, chat: &Chat) -> XmppResult<usize>;

    async fn join_room(&mut self, room: &str, nick: &str) -> XmppResult<()>;

    async fn close(&mut self) {}
}

/// Opens authenticated chat sessions
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self) -> XmppResult<Box<dyn ChatSession>>;
}

#[async_trait]
impl ChatSession for XmppClient {
    async fn send(&mut self, chat: &Chat) -> XmppResult<usize> {
        XmppClient::send(self, chat).await
    }

    async fn join_room(&mut self, room: &str, nick: &str) -> XmppResult<()> {
        self.join_muc_no_history(room, nick).await
    }

    async fn close(&mut self) {
        XmppClient::close(self).await
    }
}

/// Connects real XMPP clients
pub struct XmppConnector {
    options: XmppOptions,
}

impl XmppConnector {
    pub fn new(options: XmppOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ChatConnector for XmppConnector {
    async fn connect(&self) -> XmppResult<Box<dyn ChatSession>> {
        let client = XmppClient::connect(&self.options).await?;
        tracing::info!(jid = %client.jid(), "xmpp: session ready");
        Ok(Box::new(client))
    }
}

/// Where and how messages are delivered
#[derive(Debug)]
pub enum Delivery {
    /// Join `room` as `nick` after every connect and broadcast to it
    Room { room: String, nick: String },
    /// Direct messages to an address computed per payload
    Direct { to: DestinationTemplate },
}

/// Link states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    /// Session usable, writes go straight through
    Connected = 0,
    /// A write failed and the session is being replaced
    Reconnecting = 1,
}

impl From<u8> for LinkState {
    fn from(value: u8) -> Self {
        match value {
            1 => LinkState::Reconnecting,
            _ => LinkState::Connected,
        }
    }
}

/// Persistent chat output.
///
/// A failed write triggers exactly one reconnect (including the room join)
/// followed by exactly one retry. If either fails the error is
/// [`OutputError::Fatal`]. The whole write-and-recover path runs under one
/// lock, so concurrent requests never race to reconnect.
pub struct XmppOutput {
    connector: Box<dyn ChatConnector>,
    delivery: Delivery,
    session: Mutex<Option<Box<dyn ChatSession>>>,
    state: AtomicU8,
    reconnects: AtomicU64,
}

impl XmppOutput {
    /// Connect once; a failure here is a startup failure.
    pub async fn connect(
        connector: impl ChatConnector + 'static,
        delivery: Delivery,
    ) -> XmppResult<Self> {
        let connector: Box<dyn ChatConnector> = Box::new(connector);
        let session = Self::establish(connector.as_ref(), &delivery).await?;

        Ok(Self {
            connector,
            delivery,
            session: Mutex::new(Some(session)),
            state: AtomicU8::new(LinkState::Connected as u8),
            reconnects: AtomicU64::new(0),
        })
    }

    async fn establish(
        connector: &dyn ChatConnector,
        delivery: &Delivery,
    ) -> XmppResult<Box<dyn ChatSession>> {
        let mut session = connector.connect().await?;
        if let Delivery::Room { room, nick } = delivery {
            session.join_room(room, nick).await?;
            tracing::info!(room = %room, nick = %nick, "xmpp: joined room");
        }
        Ok(session)
    }

    pub fn state(&self) -> LinkState {
        LinkState::from(self.state.load(Ordering::Acquire))
    }

    /// Successful reconnects since startup
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Send a one-off greeting to the configured destination.
    pub async fn announce(&self, text: &str) -> Result<usize, OutputError> {
        let destination = self.route(&json!({})).map_err(|e| {
            OutputError::Delivery(format!("cannot render destination for greeting: {e}"))
        })?;
        self.write(&OutgoingMessage::new(text).with_destination(destination))
            .await
    }

    fn chat_for(&self, message: &OutgoingMessage) -> Result<Chat, OutputError> {
        let (remote, kind) = match &self.delivery {
            Delivery::Room { room, .. } => (room.clone(), ChatKind::GroupChat),
            Delivery::Direct { to } => {
                let remote = match &message.destination {
                    Some(destination) => destination.clone(),
                    None => to
                        .render(json!({}))
                        .map_err(|e| OutputError::Delivery(e.to_string()))?,
                };
                (remote, ChatKind::Chat)
            }
        };

        Ok(Chat {
            remote,
            kind,
            text: message.body.clone(),
        })
    }

    fn set_state(&self, state: LinkState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

#[async_trait]
impl Output for XmppOutput {
    fn name(&self) -> &'static str {
        "xmpp"
    }

    fn route(&self, payload: &serde_json::Value) -> TemplateResult<Option<String>> {
        match &self.delivery {
            Delivery::Room { .. } => Ok(None),
            Delivery::Direct { to } => to.render(payload).map(Some),
        }
    }

    async fn write(&self, message: &OutgoingMessage) -> Result<usize, OutputError> {
        let chat = self.chat_for(message)?;
        let mut session = self.session.lock().await;

        let first = match session.as_mut() {
            Some(current) => current.send(&chat).await,
            None => Err(crate::xmpp::XmppError::NotConnected),
        };
        let err = match first {
            Ok(_) => return Ok(message.body.len()),
            Err(err) => err,
        };

        tracing::warn!(error = %err, remote = %chat.remote, "xmpp write failed, reconnecting");
        self.set_state(LinkState::Reconnecting);
        *session = None;

        let mut fresh = Self::establish(self.connector.as_ref(), &self.delivery)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "xmpp reconnect failed");
                OutputError::Fatal(format!("reconnect failed: {e}"))
            })?;
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        tracing::info!("xmpp reconnected");

        match fresh.send(&chat).await {
            Ok(_) => {
                *session = Some(fresh);
                self.set_state(LinkState::Connected);
                Ok(message.body.len())
            }
            Err(e) => {
                tracing::error!(error = %e, remote = %chat.remote, "xmpp write failed after reconnect");
                Err(OutputError::Fatal(format!("write failed after reconnect: {e}")))
            }
        }
    }

    async fn close(&self) {
        if let Some(session) = self.session.lock().await.as_mut() {
            session.close().await;
        }
    }
}
