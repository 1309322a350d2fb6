use std::sync::Arc;
use std::time::Duration;

use exchange_core::ExchangeApi;
use metrics::SharedMetrics;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Background renewal of one session lease.
///
/// Lives exactly as long as the streaming session it belongs to. Cancelling
/// it releases the lease on the exchange (best effort).
pub(crate) struct LeaseRenewal {
    cancel_tx: Option<oneshot::Sender<()>>,
    expired_rx: oneshot::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl LeaseRenewal {
    pub(crate) fn spawn(
        exchange: Arc<dyn ExchangeApi>,
        session: String,
        interval: Duration,
        metrics: SharedMetrics,
    ) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (expired_tx, expired_rx) = oneshot::channel();
        let handle = tokio::spawn(renewal_loop(
            exchange, session, interval, cancel_rx, expired_tx, metrics,
        ));

        Self {
            cancel_tx: Some(cancel_tx),
            expired_rx,
            handle: Some(handle),
        }
    }

    /// Resolves when the exchange reported the lease as no longer valid.
    pub(crate) async fn expired(&mut self) {
        // A dropped sender means the renewal task is gone; the lease is not
        // being kept alive any more either way.
        let _ = (&mut self.expired_rx).await;
    }

    /// Stop renewing and release the lease. Waits for the release to finish.
    pub(crate) async fn cancel(mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Lease renewal task failed");
            }
        }
    }
}

impl Drop for LeaseRenewal {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn renewal_loop(
    exchange: Arc<dyn ExchangeApi>,
    session: String,
    interval: Duration,
    mut cancel_rx: oneshot::Receiver<()>,
    expired_tx: oneshot::Sender<()>,
    metrics: SharedMetrics,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = &mut cancel_rx => {
                match exchange.close_session(&session).await {
                    Ok(()) => info!("Session lease released"),
                    Err(e) => warn!(error = %e, "Failed to release session lease"),
                }
                return;
            }

            _ = ticker.tick() => {
                match exchange.renew_session(&session).await {
                    Ok(()) => debug!("Session lease renewed"),
                    Err(e) if e.is_session_expired() => {
                        warn!("Session lease expired during renewal");
                        metrics.inc_stream_errors();
                        let _ = expired_tx.send(());
                        return;
                    }
                    Err(e) => {
                        // Keep the stream up; retry on the next tick.
                        warn!(error = %e, "Failed to renew session lease, will retry");
                        metrics.inc_stream_errors();
                    }
                }
            }
        }
    }
}
