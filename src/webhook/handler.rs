use std::sync::Arc;

use axum::{body::Body, extract::State, http::StatusCode};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::output::OutgoingMessage;
use crate::server::AppState;
use crate::template::TemplateSet;

/// Decoded webhook body. Always a JSON object.
pub type Payload = serde_json::Value;

/// Decode a request body, rejecting anything but a JSON object.
pub fn decode_payload(body: &[u8]) -> Result<Payload> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)?;
    Ok(serde_json::Value::Object(object))
}

/// Handle one webhook.
///
/// - 200: the rendered message was handed to the output
/// - 204: the template rendered nothing, no delivery attempted
/// - 500: anything else, including oversized bodies and bodies that are not
///   a JSON object, whatever the request method
#[tracing::instrument(name = "webhook", skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn receive_webhook(State(state): State<AppState>, body: Body) -> Result<StatusCode> {
    let body = axum::body::to_bytes(body, state.body_limit).await?;
    let payload = Arc::new(decode_payload(&body)?);

    if state.debug {
        match serde_json::to_string_pretty(payload.as_ref()) {
            Ok(pretty) => eprintln!("{pretty}"),
            Err(e) => tracing::warn!(error = %e, "Can't dump payload"),
        }
    }

    // Templates are read from disk on every request
    let templates = state.templates.clone();
    let context = payload.clone();
    let message = tokio::task::spawn_blocking(move || {
        let set = TemplateSet::load(&templates.dir, &templates.main, &templates.suffix)?;
        tracing::trace!(entry = set.entry(), fragments = set.names().len(), "Templates loaded");
        set.execute(context.as_ref())
    })
    .await
    .map_err(|e| AppError::Internal(format!("render task failed: {e}")))??;

    if message.is_empty() {
        tracing::debug!("Template rendered nothing, skipping delivery");
        return Ok(StatusCode::NO_CONTENT);
    }

    let destination = state.output.route(&payload)?;
    let message = OutgoingMessage::new(message).with_destination(destination);

    match state.output.write(&message).await {
        Ok(written) => {
            tracing::debug!(
                output = state.output.name(),
                bytes = written,
                destination = ?message.destination,
                "Message delivered"
            );
            Ok(StatusCode::OK)
        }
        Err(e) => {
            if e.is_fatal() {
                (state.on_fatal)(&e);
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object() {
        let payload = decode_payload(br#"{"issue":"JIRA-1"}"#).unwrap();
        assert_eq!(payload["issue"], "JIRA-1");
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(decode_payload(b"[1, 2]"), Err(AppError::Decode(_))));
        assert!(matches!(decode_payload(b"\"text\""), Err(AppError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(matches!(decode_payload(br#"{"issue":"#), Err(AppError::Decode(_))));
    }
}
