use std::{io, net::SocketAddr};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{config::ConfigError, mcp::handle::ServerError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: String,
    },
    #[error("unavailable: {message}")]
    Unavailable {
        code: &'static str,
        message: &'static str,
    },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(code: &'static str, message: &'static str) -> Self {
        Self::Unavailable { code, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn unknown_session() -> Self {
        Self::bad_request("unknown_session", "no active session for the given sessionId")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            Self::Unavailable { code, message } => {
                (StatusCode::SERVICE_UNAVAILABLE, code, message.to_string())
            }
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}

/// Failure to push a reply into a session's outbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound channel is closed")]
    ChannelClosed,
    #[error("outbound channel is full")]
    Backpressure,
    #[error("connection has no outbound channel")]
    NoChannel,
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error("failed to listen on {addr}: {source}")]
    Listener {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("protocol server refused the transport: {0}")]
    Handle(#[from] ServerError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("failed to release protocol server: {0}")]
    Shutdown(#[source] ServerError),
    #[error("stream i/o failed: {0}")]
    Stream(#[source] io::Error),
    #[error("http server failed: {0}")]
    Serve(#[source] io::Error),
    #[error("transport task ended abnormally: {0}")]
    Task(String),
}

impl TransportError {
    /// Startup failures abort the process; everything else is per-session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Bind(_))
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::UnknownSession(_)
            | TransportError::Delivery(DeliveryError::ChannelClosed) => AppError::unknown_session(),
            TransportError::Delivery(_) => {
                AppError::unavailable("delivery_failed", "session could not accept the reply")
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_session_is_a_client_error() {
        let response =
            AppError::from(TransportError::UnknownSession("ghost".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn closed_channel_resolves_to_unknown_session() {
        let response =
            AppError::from(TransportError::Delivery(DeliveryError::ChannelClosed)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn backpressure_is_unavailable() {
        let response =
            AppError::from(TransportError::Delivery(DeliveryError::Backpressure)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn only_startup_errors_are_fatal() {
        assert!(TransportError::Config(ConfigError::InvalidPort).is_fatal());
        assert!(TransportError::Bind(BindError::Handle(ServerError::Closed)).is_fatal());
        assert!(!TransportError::UnknownSession("s".to_string()).is_fatal());
    }
}
