//! Output factory

use std::sync::Arc;
use std::time::Duration;

use crate::config::{OutputConfig, OutputKind, XmppConfig};
use crate::error::{AppError, Result};
use crate::template::DestinationTemplate;
use crate::xmpp::XmppOptions;

use super::mod_rest::ModRestOutput;
use super::stdout::StdoutOutput;
use super::xmpp::{Delivery, XmppConnector, XmppOutput};
use super::Output;

/// Create the configured output.
///
/// Returns the implementation selected by `kind`:
/// - `"stdout"`: a [`StdoutOutput`]
/// - `"mod_rest"`: a [`ModRestOutput`]
/// - `"xmpp"`: a connected [`XmppOutput`]; the room is joined (or the
///   destination template compiled) before this returns, and the optional
///   greeting is sent
pub async fn create_output(config: &OutputConfig) -> Result<Arc<dyn Output>> {
    match config.kind {
        OutputKind::Stdout => Ok(Arc::new(StdoutOutput::new())),
        OutputKind::ModRest => {
            let output = ModRestOutput::new(&config.mod_rest)?;
            tracing::info!(url = %config.mod_rest.url, to = %config.mod_rest.to, "Using mod_rest output");
            Ok(Arc::new(output))
        }
        OutputKind::Xmpp => {
            let xmpp = &config.xmpp;
            let delivery = if xmpp.join {
                Delivery::Room {
                    room: xmpp.to.clone(),
                    nick: xmpp.nick.clone(),
                }
            } else {
                Delivery::Direct {
                    to: DestinationTemplate::parse(&xmpp.to)?,
                }
            };

            let output = XmppOutput::connect(XmppConnector::new(xmpp_options(xmpp)), delivery)
                .await
                .map_err(AppError::from)?;
            tracing::info!(host = %xmpp.host, user = %xmpp.user, join = xmpp.join, "Using xmpp output");

            if let Some(greeting) = xmpp.presence.as_deref().filter(|g| !g.is_empty()) {
                output.announce(greeting).await?;
            }

            Ok(Arc::new(output))
        }
    }
}

/// Client options for an `[output.xmpp]` section
pub fn xmpp_options(config: &XmppConfig) -> XmppOptions {
    XmppOptions {
        host: config.host.clone(),
        user: config.user.clone(),
        password: config.password.clone(),
        resource: config.resource.clone(),
        tls: config.tls,
        verify_host: config.verify_tls_host,
        session: true,
        status: config.status.clone(),
        status_message: config.status_msg.clone(),
        debug: config.xml_debug,
        connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        send_timeout: Duration::from_secs(config.send_timeout_secs),
    }
}
