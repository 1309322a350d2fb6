use thiserror::Error;

/// Errors surfaced through the exchange capability traits.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Network failure, timeout, or unexpected HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange rejected the request.
    #[error("exchange API error {code}: {message}")]
    Api { code: i32, message: String },

    /// The streaming session lease is no longer valid.
    #[error("session lease expired")]
    SessionExpired,

    #[error("order not found")]
    OrderNotFound,

    #[error("insufficient balance")]
    InsufficientBalance,

    /// A payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The stream was closed by the server.
    #[error("stream closed")]
    StreamClosed,
}

impl ExchangeError {
    /// Session loss is recovered by re-authenticating, not by backing off.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}
