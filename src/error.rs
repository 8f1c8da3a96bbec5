//! Error types surfaced across the client's public API (spec §7).

use thiserror::Error;

/// Failures a caller can observe from [`crate::client::Client`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("framing error: {0}")]
    Framing(#[from] fc_protocol::CodecError),

    #[error("login rejected (code {code})")]
    LoginRejected { code: i32 },

    #[error("timed out waiting to connect")]
    ConnectTimeout,

    #[error("timed out waiting for login response")]
    LoginTimeout,

    #[error("join refused: {reason}")]
    JoinRefused { reason: String },

    #[error("timed out waiting for a query response")]
    QueryTimeout,

    #[error("not connected")]
    Disconnected,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP fetch failed: {0}")]
    Http(#[from] HttpError),
}

/// `HttpGet` failures (spec §6), kept separate from [`ClientError`] so the
/// `HttpGet` trait doesn't need to depend on the client's own error type.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}

impl From<crate::transport::TransportError> for ClientError {
    fn from(e: crate::transport::TransportError) -> Self {
        match e {
            crate::transport::TransportError::Io(e) => ClientError::Io(e),
            crate::transport::TransportError::WebSocket(e) => ClientError::WebSocket(e),
            crate::transport::TransportError::Codec(e) => ClientError::Framing(e),
        }
    }
}
