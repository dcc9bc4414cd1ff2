use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::output::OutputError;
use crate::template::TemplateError;
use crate::xmpp::XmppError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Can't read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("Can't decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("XMPP error: {0}")]
    Xmpp(#[from] XmppError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Body(_) => "BODY_ERROR",
            AppError::Decode(_) => "DECODE_ERROR",
            AppError::Template(_) => "TEMPLATE_ERROR",
            AppError::Output(_) => "OUTPUT_ERROR",
            AppError::Xmpp(_) => "XMPP_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Every failure on the webhook path is reported as a server error,
        // including payloads that fail to decode
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let code = self.code();
        let log_message = self.to_string();
        let client_message = if is_production() {
            "Internal server error".to_string()
        } else {
            log_message.clone()
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "Webhook error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_is_server_error() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.code(), "DECODE_ERROR");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_output_error_code() {
        let err = AppError::from(OutputError::Delivery("refused".into()));
        assert_eq!(err.code(), "OUTPUT_ERROR");
        assert!(err.to_string().contains("refused"));
    }
}
