use std::sync::Arc;
use std::time::Duration;

use balance_ledger::SharedLedger;
use common::ExponentialBackoff;
use exchange_core::{AccountFeed, AccountMessage, BalancePosition, ExchangeApi, ExchangeError};
use metrics::SharedMetrics;
use notifier::SharedNotifier;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::lease::LeaseRenewal;
use crate::{StreamConfig, SupervisorState};

/// Result of a streaming session.
enum SessionResult {
    /// Shutdown was requested
    Shutdown,
    /// The stream was up and then ended
    Ended {
        uptime: Duration,
        error: ExchangeError,
    },
    /// Failed to connect with the session lease
    ConnectFailed(ExchangeError),
}

/// Owns the account stream and keeps the balance ledger in sync with it.
pub struct AccountStreamSupervisor {
    exchange: Arc<dyn ExchangeApi>,
    feed: Arc<dyn AccountFeed>,
    ledger: SharedLedger,
    config: StreamConfig,
    metrics: SharedMetrics,
    notifier: Option<SharedNotifier>,
}

impl AccountStreamSupervisor {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        feed: Arc<dyn AccountFeed>,
        ledger: SharedLedger,
        config: StreamConfig,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            exchange,
            feed,
            ledger,
            config,
            metrics,
            notifier: None,
        }
    }

    /// Push an "assets updated" message for every applied balance event.
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Load the initial balance snapshot, then spawn the supervision loop.
    ///
    /// A snapshot failure is returned before anything is spawned: trading
    /// without a known balance is not possible.
    pub async fn start(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(JoinHandle<()>, watch::Receiver<SupervisorState>), ExchangeError> {
        let snapshot = self.exchange.account_snapshot().await?;
        info!(
            assets = snapshot.balances.len(),
            "Fetched initial account snapshot"
        );
        self.ledger.initialize(&snapshot).await;

        let (state_tx, state_rx) = watch::channel(SupervisorState::Disconnected);
        let handle = tokio::spawn(self.run(state_tx, shutdown_rx));
        Ok((handle, state_rx))
    }

    async fn run(self, state_tx: watch::Sender<SupervisorState>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut backoff = self.config.backoff.build();
        let mut needs_resync = false;

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown requested, exiting account stream");
                return;
            }

            if needs_resync {
                match self.resync().await {
                    Ok(()) => needs_resync = false,
                    Err(e) => {
                        warn!(error = %e, "Balance resync failed");
                        self.metrics.inc_stream_errors();
                        if wait_or_shutdown(&mut backoff, &mut shutdown_rx).await {
                            return;
                        }
                        continue;
                    }
                }
            }

            state_tx.send_replace(SupervisorState::Authenticating);
            let session = match self.exchange.start_session().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "Failed to obtain session lease");
                    self.metrics.inc_stream_errors();
                    state_tx.send_replace(SupervisorState::Disconnected);
                    if wait_or_shutdown(&mut backoff, &mut shutdown_rx).await {
                        return;
                    }
                    continue;
                }
            };
            info!("Obtained session lease, connecting to account stream");

            let mut lease = LeaseRenewal::spawn(
                self.exchange.clone(),
                session.clone(),
                self.config.lease_renewal(),
                self.metrics.clone(),
            );
            let result = self
                .run_session(&session, &mut lease, &state_tx, &mut shutdown_rx)
                .await;
            lease.cancel().await;
            state_tx.send_replace(SupervisorState::Disconnected);

            // Every way out of a session, other than shutdown, leaves a gap in
            // the event stream.
            needs_resync = true;

            match result {
                SessionResult::Shutdown => {
                    info!("Account stream shutdown complete");
                    return;
                }
                SessionResult::Ended { error, .. } if error.is_session_expired() => {
                    info!("Session lease expired, re-authenticating");
                    self.metrics.inc_reconnect_attempts();
                }
                SessionResult::Ended { uptime, error } => {
                    if backoff.record_uptime(uptime, self.config.stable_after()) {
                        info!(
                            uptime_secs = uptime.as_secs(),
                            "Connection was stable, resetting backoff"
                        );
                    }
                    self.metrics.inc_reconnect_attempts();
                    warn!(error = %error, "Account stream lost, reconnecting");
                    if wait_or_shutdown(&mut backoff, &mut shutdown_rx).await {
                        return;
                    }
                }
                SessionResult::ConnectFailed(e) => {
                    self.metrics.inc_stream_errors();
                    warn!(error = %e, "Account stream connection failed");
                    if wait_or_shutdown(&mut backoff, &mut shutdown_rx).await {
                        return;
                    }
                }
            }
        }
    }

    async fn resync(&self) -> Result<(), ExchangeError> {
        let snapshot = self.exchange.account_snapshot().await?;
        self.ledger.initialize(&snapshot).await;
        self.metrics.inc_resyncs();
        info!(assets = snapshot.balances.len(), "Balances resynchronized");
        Ok(())
    }

    async fn run_session(
        &self,
        session: &str,
        lease: &mut LeaseRenewal,
        state_tx: &watch::Sender<SupervisorState>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SessionResult {
        let connect = tokio::select! {
            biased;

            _ = shutdown_signalled(shutdown_rx) => return SessionResult::Shutdown,
            result = self.feed.connect(session) => result,
        };
        let mut stream = match connect {
            Ok(stream) => stream,
            Err(e) => return SessionResult::ConnectFailed(e),
        };

        info!("Connected to account stream");
        state_tx.send_replace(SupervisorState::Streaming);
        let connected_at = Instant::now();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_signalled(shutdown_rx) => {
                    info!("Shutdown signal received, closing account stream");
                    return SessionResult::Shutdown;
                }

                _ = lease.expired() => {
                    return SessionResult::Ended {
                        uptime: connected_at.elapsed(),
                        error: ExchangeError::SessionExpired,
                    };
                }

                msg = stream.recv() => {
                    match msg {
                        Some(Ok(AccountMessage::BalancePosition(position))) => {
                            self.metrics.inc_account_messages();
                            self.apply_position(position).await;
                        }
                        Some(Ok(AccountMessage::Other { event_type })) => {
                            self.metrics.inc_account_messages();
                            trace!(event_type = %event_type, "Ignoring account event");
                        }
                        Some(Err(e)) => {
                            return SessionResult::Ended {
                                uptime: connected_at.elapsed(),
                                error: e,
                            };
                        }
                        None => {
                            info!("Account stream ended");
                            return SessionResult::Ended {
                                uptime: connected_at.elapsed(),
                                error: ExchangeError::StreamClosed,
                            };
                        }
                    }
                }
            }
        }
    }

    async fn apply_position(&self, position: BalancePosition) {
        let mut updated = Vec::new();

        for raw in &position.balances {
            let free = match raw.free() {
                Ok(free) => free,
                Err(e) => {
                    warn!(asset = %raw.asset, free = %raw.free, error = %e, "Skipping malformed balance");
                    self.metrics.inc_parse_errors();
                    continue;
                }
            };
            if self
                .ledger
                .apply_update(&raw.asset, free, position.event_time_ms)
                .await
            {
                updated.push(raw.asset.as_str());
            }
        }

        debug!(
            event_time_ms = position.event_time_ms,
            received = position.balances.len(),
            applied = updated.len(),
            "Balance position processed"
        );

        if updated.is_empty() {
            return;
        }
        if let Some(notifier) = &self.notifier {
            let notifier = notifier.clone();
            let message = format!("assets {} updated", updated.join(","));
            tokio::spawn(async move { notifier.push(&message).await });
        }
    }
}

/// Resolves once shutdown is signalled or the signal sender is gone.
async fn shutdown_signalled(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for the next backoff delay. Returns `true` if shutdown came first.
async fn wait_or_shutdown(
    backoff: &mut ExponentialBackoff,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let delay = backoff.next_delay();
    debug!(
        attempt = backoff.attempt(),
        delay_secs = delay.as_secs_f64(),
        "Waiting before reconnect"
    );

    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown_signalled(shutdown_rx) => {
            info!("Shutdown requested during backoff");
            true
        }
    }
}
