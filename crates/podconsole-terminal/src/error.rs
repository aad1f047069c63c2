//! Error types for podconsole-terminal
//!
//! This module provides error types for the exec relay,
//! including frame decoding, connection and heartbeat errors.

use thiserror::Error;

/// Terminal relay error type
#[derive(Debug, Error)]
pub enum Error {
    /// A channel frame could not be decoded
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The client tried to write a server-only channel
    #[error("channel {0} cannot be written by the client")]
    InvalidOutboundChannel(u8),

    /// The exec socket could not be established
    #[error("could not connect to {target}: {reason}")]
    Connect {
        /// Human readable description of the exec target
        target: String,
        /// Underlying failure
        reason: String,
    },

    /// The container has no `sh` to exec into
    #[error("no shell available in container {container} of pod {pod}")]
    NoShellAvailable {
        /// Pod name
        pod: String,
        /// Container name
        container: String,
    },

    /// WebSocket transport error after connecting
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Invalid exec target or base URL
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Heartbeat request failed
    #[error("heartbeat error: {0}")]
    Heartbeat(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a malformed frame error
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Create a WebSocket error
    #[must_use]
    pub fn websocket(msg: impl Into<String>) -> Self {
        Self::WebSocket(msg.into())
    }

    /// Check if error is recoverable by opening a new connection
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::WebSocket(_) | Self::Heartbeat(_) | Self::MalformedFrame(_)
        )
    }

    /// Get a stable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "malformed_frame",
            Self::InvalidOutboundChannel(_) => "invalid_outbound_channel",
            Self::Connect { .. } => "session_connect_error",
            Self::NoShellAvailable { .. } => "no_shell_available",
            Self::WebSocket(_) => "websocket_error",
            Self::InvalidTarget(_) => "invalid_target",
            Self::Heartbeat(_) => "heartbeat_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidTarget(err.to_string())
    }
}

/// Result type alias for terminal operations
pub type Result<T> = std::result::Result<T, Error>;
