//! ejabberd mod_rest relay

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use super::{OutgoingMessage, Output, OutputError};
use crate::config::ModRestConfig;

#[derive(Debug, Serialize)]
#[serde(rename = "message")]
struct Envelope<'a> {
    #[serde(rename = "@from")]
    from: &'a str,
    #[serde(rename = "@to")]
    to: &'a str,
    body: &'a str,
}

/// Posts `<message from=".." to=".."><body>..</body></message>` to a
/// fixed URL.
///
/// Unless `fail_on_error` is set the POST is fire-and-forget: transport
/// failures and non-2xx answers are logged and the write still succeeds.
pub struct ModRestOutput {
    client: reqwest::Client,
    url: String,
    from: String,
    to: String,
    fail_on_error: bool,
}

impl ModRestOutput {
    pub fn new(config: &ModRestConfig) -> Result<Self, OutputError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OutputError::Delivery(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            from: config.from.clone(),
            to: config.to.clone(),
            fail_on_error: config.fail_on_error,
        })
    }

    pub fn envelope(&self, to: &str, body: &str) -> Result<String, OutputError> {
        let envelope = Envelope {
            from: &self.from,
            to,
            body,
        };
        quick_xml::se::to_string(&envelope).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialize mod_rest envelope");
            OutputError::Serialization(e.to_string())
        })
    }

    fn failed(&self, reason: String) -> Result<(), OutputError> {
        tracing::warn!(url = %self.url, reason = %reason, "mod_rest delivery failed");
        if self.fail_on_error {
            Err(OutputError::Delivery(reason))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Output for ModRestOutput {
    fn name(&self) -> &'static str {
        "mod_rest"
    }

    async fn write(&self, message: &OutgoingMessage) -> Result<usize, OutputError> {
        let to = message.destination.as_deref().unwrap_or(&self.to);
        let xml = self.envelope(to, &message.body)?;

        let result = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/xml")
            .body(xml)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(status = %response.status(), "mod_rest accepted message");
            }
            Ok(response) => self.failed(format!("relay answered {}", response.status()))?,
            Err(e) => self.failed(e.to_string())?,
        }

        Ok(message.body.len())
    }
}
