//! # Error Handling
//!
//! Application error taxonomy and its mapping to HTTP responses.
//!
//! ## Failure Classes:
//! - **Transport**: channel open failure, unexpected close, send-while-closed.
//!   Surfaced through the connection status; manual reconnect required.
//! - **Media**: microphone permission denied, unsupported capture primitive.
//!   The capture path falls back where possible; otherwise the session stays
//!   connected for playback sync only.
//! - **Protocol**: unparseable control traffic. Logged and dropped, the
//!   connection continues.
//! - **SessionFull**: capacity signal from the relay. The channel closes,
//!   the user is notified, no auto-retry.
//! - **Validation**: bad score submission or config update. Surfaced inline,
//!   nothing is sent.
//!
//! No error here is fatal to the process; every failure degrades a single
//! session, not the service.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Application error type covering every failure class in the session core.
#[derive(Debug)]
pub enum AppError {
    /// Duplex channel failures (open, unexpected close, send)
    Transport(String),

    /// Microphone / capture primitive failures
    Media(String),

    /// Unparseable or invalid protocol traffic
    Protocol(String),

    /// The session already has its maximum number of participants
    SessionFull,

    /// User input failed validation rules
    Validation(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// Internal server errors (everything else server-side)
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::Media(msg) => write!(f, "Media error: {}", msg),
            AppError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            AppError::SessionFull => write!(f, "Session is full"),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Conversion of application errors into HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - Protocol/Validation → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
/// - SessionFull → 409 (Conflict)
/// - Transport/Media/Config/Internal → 500 (Internal Server Error)
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Score must be between 0 and 100",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::Transport(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "transport_error",
                msg.clone(),
            ),
            AppError::Media(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "media_error",
                msg.clone(),
            ),
            AppError::Protocol(msg) => (
                StatusCode::BAD_REQUEST,
                "protocol_error",
                msg.clone(),
            ),
            AppError::SessionFull => (
                StatusCode::CONFLICT,
                "session_full",
                "Session is full".to_string(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// General-purpose errors become internal errors.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing failures are protocol errors: the traffic was malformed,
/// not the server.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Protocol(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// WebSocket channel failures map onto the transport class.
impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
