use thiserror::Error;

/// Errors from the WebSocket connectors.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed by server")]
    ConnectionClosed,

    /// The consumer dropped its receiver; there is nobody to deliver to.
    #[error("Event channel closed")]
    ChannelClosed,
}
