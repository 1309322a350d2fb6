use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ConnectorError;

/// Timeout for WebSocket connection attempts.
pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket, giving up after [`CONNECTION_TIMEOUT`].
pub(crate) async fn connect(url: &str) -> Result<WsStream, ConnectorError> {
    match tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(url)).await {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(e)) => Err(ConnectorError::WebSocket(e.to_string())),
        Err(_) => Err(ConnectorError::WebSocket("connection timeout".to_string())),
    }
}

/// Result of a connection attempt.
pub(crate) enum ConnectResult {
    Connected(WsStream),
    Shutdown,
    Error(ConnectorError),
}

/// Attempt to connect with timeout, abandoning the attempt on shutdown.
pub(crate) async fn connect_with_shutdown(
    url: &str,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnectResult {
    tokio::select! {
        biased;

        _ = shutdown_signalled(shutdown_rx) => ConnectResult::Shutdown,

        result = connect(url) => match result {
            Ok(stream) => ConnectResult::Connected(stream),
            Err(e) => ConnectResult::Error(e),
        },
    }
}

/// Resolves once shutdown is signalled or the signal sender is gone.
pub(crate) async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
