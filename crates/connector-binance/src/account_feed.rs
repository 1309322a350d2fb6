//! WebSocket transport for the user data stream.

use async_trait::async_trait;
use common::BinanceEnvironment;
use exchange_core::{AccountFeed, AccountMessage, AccountStream, ExchangeError};
use futures_util::{SinkExt, StreamExt};
use metrics::SharedMetrics;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::user_data_parser::{parse_user_data_message, UserDataEvent};
use crate::ws::{self, WsStream};

/// Buffered account messages between the socket pump and the supervisor.
const ACCOUNT_CHANNEL_CAPACITY: usize = 256;

type AccountSender = mpsc::Sender<Result<AccountMessage, ExchangeError>>;

/// Connects to the user data stream of a listen key.
///
/// Each connection gets its own pump task that answers pings and forwards
/// decoded events. Dropping the returned stream stops the pump.
pub struct BinanceAccountFeed {
    environment: BinanceEnvironment,
    metrics: SharedMetrics,
}

impl BinanceAccountFeed {
    pub fn new(environment: BinanceEnvironment, metrics: SharedMetrics) -> Self {
        Self {
            environment,
            metrics,
        }
    }
}

#[async_trait]
impl AccountFeed for BinanceAccountFeed {
    async fn connect(&self, session: &str) -> Result<AccountStream, ExchangeError> {
        let url = self.environment.account_stream_url(session);
        info!(environment = %self.environment, "Connecting to user data stream");

        let ws_stream = ws::connect(&url)
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(ACCOUNT_CHANNEL_CAPACITY);
        tokio::spawn(pump(ws_stream, tx, self.metrics.clone()));
        Ok(rx)
    }
}

/// Forward socket frames to `tx` until either side goes away.
///
/// A clean close just drops `tx`, which the receiver sees as end of stream.
async fn pump(ws_stream: WsStream, tx: AccountSender, metrics: SharedMetrics) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            _ = tx.closed() => {
                debug!("User data receiver dropped, closing socket");
                let _ = write.close().await;
                return;
            }

            msg_opt = read.next() => {
                let msg = match msg_opt {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!(error = %e, "User data WebSocket error");
                        metrics.inc_stream_errors();
                        let _ = tx.send(Err(ExchangeError::Transport(e.to_string()))).await;
                        return;
                    }
                    None => {
                        info!("User data stream ended");
                        return;
                    }
                };

                match msg {
                    Message::Text(text) => match parse_user_data_message(&text) {
                        Ok(UserDataEvent::Account(event)) => {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                        Ok(UserDataEvent::ListenKeyExpired) => {
                            warn!("Listen key expired by server");
                            let _ = tx.send(Err(ExchangeError::SessionExpired)).await;
                            return;
                        }
                        Err(e) => {
                            metrics.inc_parse_errors();
                            warn!(error = %e, "Failed to parse user data message");
                        }
                    },
                    Message::Ping(data) => {
                        debug!("Received Ping, sending Pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send Pong");
                            metrics.inc_stream_errors();
                            let _ = tx.send(Err(ExchangeError::Transport(e.to_string()))).await;
                            return;
                        }
                    }
                    Message::Close(_) => {
                        info!("User data stream closed by server");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
