//! Reconnecting candle stream for one symbol.

use std::time::Duration;

use common::{BackoffPolicy, BinanceEnvironment};
use futures_util::{SinkExt, StreamExt};
use metrics::SharedMetrics;
use model::Candle;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::ConnectorError;
use crate::kline_parser::{parse_kline_message, ParsedKline};
use crate::ws::{connect_with_shutdown, shutdown_signalled, ConnectResult};

pub type CandleSender = mpsc::Sender<Candle>;

/// Candle stream settings for one symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineStreamConfig {
    #[serde(default)]
    pub environment: BinanceEnvironment,
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Seconds a connection must stay up before the backoff resets.
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_stable_after_secs() -> u64 {
    300
}

impl KlineStreamConfig {
    pub fn new(environment: BinanceEnvironment, symbol: impl Into<String>) -> Self {
        Self {
            environment,
            symbol: symbol.into(),
            interval: default_interval(),
            backoff: BackoffPolicy::default(),
            stable_after_secs: default_stable_after_secs(),
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = interval.into();
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy, stable_after_secs: u64) -> Self {
        self.backoff = backoff;
        self.stable_after_secs = stable_after_secs;
        self
    }

    pub fn url(&self) -> String {
        self.environment
            .kline_stream_url(&self.symbol, &self.interval)
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_after_secs)
    }
}

/// Result of a session.
enum SessionResult {
    /// Shutdown was requested
    Shutdown,
    /// Session connected and later ended
    Connected {
        duration: Duration,
        error: ConnectorError,
    },
    /// Failed to connect
    ConnectFailed(ConnectorError),
}

async fn run_session(
    url: &str,
    sender: &CandleSender,
    shutdown_rx: &mut watch::Receiver<bool>,
    metrics: &SharedMetrics,
) -> SessionResult {
    info!(url = %url, "Connecting to kline stream");

    let ws_stream = match connect_with_shutdown(url, shutdown_rx).await {
        ConnectResult::Connected(stream) => stream,
        ConnectResult::Shutdown => return SessionResult::Shutdown,
        ConnectResult::Error(e) => return SessionResult::ConnectFailed(e),
    };

    info!(url = %url, "Connected to kline stream");
    let connected_at = Instant::now();
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_signalled(shutdown_rx) => {
                info!("Shutdown signal received, closing kline stream");
                let _ = write.close().await;
                return SessionResult::Shutdown;
            }

            msg_opt = read.next() => {
                let msg = match msg_opt {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        error!(error = %e, "Kline WebSocket error");
                        metrics.inc_stream_errors();
                        return SessionResult::Connected {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::WebSocket(e.to_string()),
                        };
                    }
                    None => {
                        info!("Kline stream ended");
                        return SessionResult::Connected {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::ConnectionClosed,
                        };
                    }
                };

                match msg {
                    Message::Text(text) => match parse_kline_message(&text) {
                        Ok(ParsedKline::Candle(candle)) => {
                            metrics.inc_candles_received();
                            if sender.send(candle).await.is_err() {
                                info!("Candle receiver dropped, stopping kline stream");
                                return SessionResult::Connected {
                                    duration: connected_at.elapsed(),
                                    error: ConnectorError::ChannelClosed,
                                };
                            }
                        }
                        Ok(ParsedKline::Unknown) => {}
                        Err(e) => {
                            metrics.inc_parse_errors();
                            warn!(error = %e, "Failed to parse kline message");
                        }
                    },
                    Message::Ping(data) => {
                        debug!("Received Ping, sending Pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to send Pong");
                            metrics.inc_stream_errors();
                            return SessionResult::Connected {
                                duration: connected_at.elapsed(),
                                error: ConnectorError::WebSocket(e.to_string()),
                            };
                        }
                    }
                    Message::Close(_) => {
                        info!("Kline stream closed by server");
                        return SessionResult::Connected {
                            duration: connected_at.elapsed(),
                            error: ConnectorError::ConnectionClosed,
                        };
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Stream candles for one symbol into `sender`, reconnecting on errors.
///
/// Returns `Ok(())` on shutdown and `Err(ChannelClosed)` once the receiver
/// is dropped; every other failure is retried with backoff.
pub async fn run_kline_stream(
    config: KlineStreamConfig,
    sender: CandleSender,
    mut shutdown_rx: watch::Receiver<bool>,
    metrics: SharedMetrics,
) -> Result<(), ConnectorError> {
    let url = config.url();
    let mut backoff = config.backoff.build();

    loop {
        if *shutdown_rx.borrow() {
            info!(symbol = %config.symbol, "Shutdown requested, exiting kline stream");
            return Ok(());
        }

        let error = match run_session(&url, &sender, &mut shutdown_rx, &metrics).await {
            SessionResult::Shutdown => {
                info!(symbol = %config.symbol, "Kline stream shutdown complete");
                return Ok(());
            }
            SessionResult::Connected { duration, error } => {
                if matches!(error, ConnectorError::ChannelClosed) {
                    return Err(ConnectorError::ChannelClosed);
                }
                if backoff.record_uptime(duration, config.stable_after()) {
                    info!(
                        duration_secs = duration.as_secs(),
                        "Connection was stable, resetting backoff"
                    );
                }
                error
            }
            SessionResult::ConnectFailed(e) => e,
        };

        metrics.inc_reconnect_attempts();
        let delay = backoff.next_delay();
        warn!(
            symbol = %config.symbol,
            error = %error,
            attempt = backoff.attempt(),
            delay_secs = delay.as_secs_f64(),
            "Kline stream interrupted, reconnecting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_signalled(&mut shutdown_rx) => {
                info!("Shutdown requested during backoff");
                return Ok(());
            }
        }
    }
}
