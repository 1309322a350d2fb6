use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::SharedMetrics;
use model::{AccountSnapshot, BalanceChange};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex as DeliveryLock;
use tracing::{debug, info, trace, warn};

use crate::{BackpressurePolicy, BalanceSender, LedgerConfig};

/// Handle returned by [`BalanceLedger::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
struct Subscriber {
    id: SubscriptionId,
    sender: BalanceSender,
}

#[derive(Debug, Default)]
struct Entry {
    quantity: Decimal,
    last_event_time_ms: u64,
    subscribers: Vec<Subscriber>,
}

/// A change waiting to be broadcast, with the subscribers it goes to.
struct Pending {
    change: BalanceChange,
    targets: Vec<Subscriber>,
}

/// Process-wide balance ledger. Construct once and share via [`SharedLedger`].
pub struct BalanceLedger {
    balances: Mutex<HashMap<String, Entry>>,
    /// Serializes the broadcast phase so notifications follow acceptance order.
    delivery: DeliveryLock<()>,
    policy: BackpressurePolicy,
    next_id: AtomicU64,
    metrics: Option<SharedMetrics>,
}

pub type SharedLedger = Arc<BalanceLedger>;

impl BalanceLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            delivery: DeliveryLock::new(()),
            policy: config.backpressure,
            next_id: AtomicU64::new(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace all balances with `snapshot`.
    ///
    /// On a fresh ledger this is a plain load. On a resync after a stream gap,
    /// subscriptions are kept, subscribed assets missing from the snapshot drop
    /// to zero, and subscribers of every asset whose quantity changed are
    /// notified. An asset already holding a stream update newer than the
    /// snapshot keeps that update.
    pub async fn initialize(&self, snapshot: &AccountSnapshot) {
        let _ordered = self.delivery.lock().await;

        let pending = {
            let mut balances = self.balances.lock();
            balances.retain(|asset, entry| {
                snapshot.balances.contains_key(asset)
                    || !entry.subscribers.is_empty()
                    || entry.last_event_time_ms > snapshot.update_time_ms
            });

            let mut pending = Vec::new();
            for (asset, entry) in balances.iter_mut() {
                if entry.last_event_time_ms > snapshot.update_time_ms {
                    continue;
                }
                let new = snapshot
                    .balances
                    .get(asset)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                let old = std::mem::replace(&mut entry.quantity, new);
                entry.last_event_time_ms = snapshot.update_time_ms;
                entry.subscribers.retain(|s| !s.sender.is_closed());

                if old != new && !entry.subscribers.is_empty() {
                    pending.push(Pending {
                        change: BalanceChange {
                            asset: asset.clone(),
                            old,
                            new,
                        },
                        targets: entry.subscribers.clone(),
                    });
                }
            }

            for (asset, quantity) in &snapshot.balances {
                balances.entry(asset.clone()).or_insert_with(|| Entry {
                    quantity: *quantity,
                    last_event_time_ms: snapshot.update_time_ms,
                    subscribers: Vec::new(),
                });
            }
            pending
        };

        info!(
            assets = snapshot.balances.len(),
            update_time_ms = snapshot.update_time_ms,
            changed = pending.len(),
            "Balance ledger initialized"
        );

        for p in pending {
            self.deliver(p).await;
        }
    }

    /// Free quantity of `asset`; zero when unknown.
    pub fn get(&self, asset: &str) -> Decimal {
        self.balances
            .lock()
            .get(asset)
            .map(|e| e.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Event time of the last accepted update for `asset`.
    pub fn last_event_time(&self, asset: &str) -> Option<u64> {
        self.balances
            .lock()
            .get(asset)
            .map(|e| e.last_event_time_ms)
    }

    /// All non-zero balances.
    pub fn snapshot(&self) -> HashMap<String, Decimal> {
        self.balances
            .lock()
            .iter()
            .filter(|(_, e)| !e.quantity.is_zero())
            .map(|(asset, e)| (asset.clone(), e.quantity))
            .collect()
    }

    /// Apply a stream update. Returns `false` when the update was stale.
    ///
    /// Unknown assets are created on first sight. Once accepted, the change is
    /// delivered to every current subscriber of the asset before this returns.
    pub async fn apply_update(&self, asset: &str, quantity: Decimal, event_time_ms: u64) -> bool {
        let _ordered = self.delivery.lock().await;

        let pending = {
            let mut balances = self.balances.lock();
            let entry = balances.entry(asset.to_string()).or_default();

            if event_time_ms <= entry.last_event_time_ms {
                trace!(
                    asset = %asset,
                    event_time_ms,
                    last_event_time_ms = entry.last_event_time_ms,
                    "Dropping stale balance update"
                );
                if let Some(m) = &self.metrics {
                    m.inc_stale_updates_dropped();
                }
                return false;
            }

            let old = std::mem::replace(&mut entry.quantity, quantity);
            entry.last_event_time_ms = event_time_ms;
            entry.subscribers.retain(|s| !s.sender.is_closed());

            Pending {
                change: BalanceChange {
                    asset: asset.to_string(),
                    old,
                    new: quantity,
                },
                targets: entry.subscribers.clone(),
            }
        };

        debug!(
            asset = %asset,
            old = %pending.change.old,
            new = %quantity,
            event_time_ms,
            subscribers = pending.targets.len(),
            "Balance updated"
        );
        if let Some(m) = &self.metrics {
            m.inc_balance_updates_applied();
        }

        self.deliver(pending).await;
        true
    }

    /// Register `sender` for changes of `asset`.
    ///
    /// Subscribing an asset with no balance yet is allowed. Registering the
    /// same channel twice for one asset returns the existing id, so a channel
    /// never receives one change twice.
    pub fn subscribe(&self, asset: &str, sender: BalanceSender) -> SubscriptionId {
        let mut balances = self.balances.lock();
        let entry = balances.entry(asset.to_string()).or_default();

        if let Some(existing) = entry
            .subscribers
            .iter()
            .find(|s| s.sender.same_channel(&sender))
        {
            return existing.id;
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entry.subscribers.push(Subscriber { id, sender });
        debug!(asset = %asset, subscription = id.0, "Balance subscriber added");
        id
    }

    /// Remove a subscription and drop its sender.
    ///
    /// The ledger holds the only senders, so the channel closes once the
    /// last subscription registered with it is removed. A channel shared by
    /// several assets stays open until every one of them is unsubscribed.
    ///
    /// Returns `false` when there was nothing to remove.
    pub fn unsubscribe(&self, asset: &str, id: SubscriptionId) -> bool {
        let removed = {
            let mut balances = self.balances.lock();
            let Some(entry) = balances.get_mut(asset) else {
                return false;
            };
            let pos = entry.subscribers.iter().position(|s| s.id == id);
            pos.map(|i| entry.subscribers.remove(i))
        };

        match removed {
            Some(_subscriber) => {
                debug!(asset = %asset, subscription = id.0, "Balance subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Number of live subscriptions for `asset`.
    pub fn subscriber_count(&self, asset: &str) -> usize {
        self.balances
            .lock()
            .get(asset)
            .map(|e| e.subscribers.len())
            .unwrap_or(0)
    }

    async fn deliver(&self, pending: Pending) {
        let Pending { change, targets } = pending;

        for target in targets {
            match self.policy {
                BackpressurePolicy::Block => {
                    if target.sender.send(change.clone()).await.is_err() {
                        debug!(asset = %change.asset, subscription = target.id.0, "Subscriber gone");
                    }
                }
                BackpressurePolicy::DropNewest => match target.sender.try_send(change.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            asset = %change.asset,
                            subscription = target.id.0,
                            "Subscriber channel full, dropping balance notification"
                        );
                        if let Some(m) = &self.metrics {
                            m.inc_notifications_dropped();
                        }
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(asset = %change.asset, subscription = target.id.0, "Subscriber gone");
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance_channel;
    use metrics::create_metrics;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn ledger() -> BalanceLedger {
        BalanceLedger::new(LedgerConfig::default())
    }

    fn snapshot(update_time_ms: u64, balances: &[(&str, Decimal)]) -> AccountSnapshot {
        AccountSnapshot {
            update_time_ms,
            balances: balances
                .iter()
                .map(|(a, q)| (a.to_string(), *q))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_unknown_asset_reads_zero() {
        let ledger = ledger();
        assert_eq!(ledger.get("DOGE"), Decimal::ZERO);
        assert_eq!(ledger.last_event_time("DOGE"), None);
    }

    #[tokio::test]
    async fn test_initialize_loads_snapshot() {
        let ledger = ledger();
        ledger
            .initialize(&snapshot(100, &[("USDT", dec!(500)), ("BNB", dec!(2.5))]))
            .await;

        assert_eq!(ledger.get("USDT"), dec!(500));
        assert_eq!(ledger.get("BNB"), dec!(2.5));
        assert_eq!(ledger.last_event_time("BNB"), Some(100));
    }

    #[tokio::test]
    async fn test_stale_updates_are_idempotent() {
        let updates = [
            (dec!(1), 10u64),
            (dec!(2), 10),
            (dec!(3), 12),
            (dec!(4), 11),
            (dec!(5), 12),
            (dec!(6), 15),
            (dec!(7), 3),
        ];

        let all = ledger();
        let mut accepted = Vec::new();
        for (qty, t) in updates {
            if all.apply_update("BNB", qty, t).await {
                accepted.push((qty, t));
            }
        }
        assert_eq!(accepted, vec![(dec!(1), 10), (dec!(3), 12), (dec!(6), 15)]);

        let increasing_only = ledger();
        for (qty, t) in &accepted {
            assert!(increasing_only.apply_update("BNB", *qty, *t).await);
        }

        assert_eq!(all.get("BNB"), increasing_only.get("BNB"));
        assert_eq!(all.last_event_time("BNB"), increasing_only.last_event_time("BNB"));
    }

    #[tokio::test]
    async fn test_update_older_than_snapshot_is_dropped() {
        let metrics = create_metrics();
        let ledger = ledger().with_metrics(metrics.clone());
        ledger.initialize(&snapshot(100, &[("BNB", dec!(1))])).await;

        assert!(!ledger.apply_update("BNB", dec!(9), 100).await);
        assert!(ledger.apply_update("BNB", dec!(2), 101).await);
        assert_eq!(ledger.get("BNB"), dec!(2));
        assert_eq!(metrics.stale_updates_dropped(), 1);
        assert_eq!(metrics.balance_updates_applied(), 1);
    }

    #[tokio::test]
    async fn test_unknown_asset_created_lazily() {
        let ledger = ledger();
        assert!(ledger.apply_update("ETH", dec!(0.5), 7).await);
        assert_eq!(ledger.get("ETH"), dec!(0.5));
    }

    #[tokio::test]
    async fn test_subscriber_receives_old_and_new() {
        let ledger = ledger();
        ledger.initialize(&snapshot(1, &[("BNB", dec!(1))])).await;

        let (tx, mut rx) = balance_channel(4);
        ledger.subscribe("BNB", tx);

        ledger.apply_update("BNB", dec!(3), 2).await;
        ledger.apply_update("USDT", dec!(10), 2).await;

        let change = rx.recv().await.unwrap();
        assert_eq!(
            change,
            BalanceChange {
                asset: "BNB".into(),
                old: dec!(1),
                new: dec!(3)
            }
        );
        assert!(rx.try_recv().is_err(), "other assets must not be delivered");
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel_and_is_repeatable() {
        let ledger = ledger();
        let (tx, mut rx) = balance_channel(4);
        let id = ledger.subscribe("BNB", tx);
        assert_eq!(ledger.subscriber_count("BNB"), 1);

        assert!(ledger.unsubscribe("BNB", id));
        assert_eq!(ledger.subscriber_count("BNB"), 0);
        assert!(rx.recv().await.is_none(), "channel must be closed");

        assert!(!ledger.unsubscribe("BNB", id));
        assert!(!ledger.unsubscribe("NEVER_SEEN", id));
    }

    #[tokio::test]
    async fn test_same_channel_subscribed_once() {
        let ledger = ledger();
        let (tx, mut rx) = balance_channel(4);
        let first = ledger.subscribe("BNB", tx.clone());
        let second = ledger.subscribe("BNB", tx);
        assert_eq!(first, second);

        ledger.apply_update("BNB", dec!(1), 1).await;
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_one_channel_can_follow_several_assets() {
        let ledger = ledger();
        let (tx, mut rx) = balance_channel(4);
        ledger.subscribe("BNB", tx.clone());
        ledger.subscribe("USDT", tx);

        ledger.apply_update("USDT", dec!(90), 1).await;
        ledger.apply_update("BNB", dec!(1), 1).await;

        assert_eq!(rx.recv().await.unwrap().asset, "USDT");
        assert_eq!(rx.recv().await.unwrap().asset, "BNB");
    }

    #[tokio::test]
    async fn test_shared_channel_closes_after_last_unsubscribe() {
        let ledger = ledger();
        let (tx, mut rx) = balance_channel(4);
        let bnb = ledger.subscribe("BNB", tx.clone());
        let usdt = ledger.subscribe("USDT", tx);

        assert!(ledger.unsubscribe("BNB", bnb));
        ledger.apply_update("USDT", dec!(90), 1).await;
        assert_eq!(rx.recv().await.unwrap().asset, "USDT");

        assert!(ledger.unsubscribe("USDT", usdt));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_newest_never_stalls_writer() {
        let metrics = create_metrics();
        let ledger = BalanceLedger::new(LedgerConfig {
            notify_capacity: 1,
            backpressure: BackpressurePolicy::DropNewest,
        })
        .with_metrics(metrics.clone());

        let (tx, mut rx) = balance_channel(1);
        ledger.subscribe("BNB", tx);

        assert!(ledger.apply_update("BNB", dec!(1), 1).await);
        assert!(ledger.apply_update("BNB", dec!(2), 2).await);

        assert_eq!(rx.recv().await.unwrap().new, dec!(1));
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.notifications_dropped(), 1);
        assert_eq!(ledger.get("BNB"), dec!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_waits_for_capacity_without_blocking_readers() {
        let ledger = Arc::new(ledger());
        let (tx, mut rx) = balance_channel(1);
        ledger.subscribe("BNB", tx);

        ledger.apply_update("BNB", dec!(1), 1).await;

        let writer = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.apply_update("BNB", dec!(2), 2).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!writer.is_finished(), "writer should wait on the full channel");
        assert_eq!(ledger.get("BNB"), dec!(2), "reads are not blocked by delivery");

        assert_eq!(rx.recv().await.unwrap().new, dec!(1));
        assert!(writer.await.unwrap());
        assert_eq!(rx.recv().await.unwrap().new, dec!(2));
    }

    #[tokio::test]
    async fn test_resync_notifies_changes_and_keeps_subscribers() {
        let ledger = ledger();
        ledger
            .initialize(&snapshot(10, &[("BNB", dec!(1)), ("USDT", dec!(100))]))
            .await;

        let (tx, mut rx) = balance_channel(8);
        ledger.subscribe("BNB", tx.clone());
        ledger.subscribe("USDT", tx.clone());
        ledger.subscribe("ETH", tx);

        ledger
            .initialize(&snapshot(20, &[("BNB", dec!(4)), ("ETH", dec!(0.2))]))
            .await;

        let mut changes = Vec::new();
        while let Ok(change) = rx.try_recv() {
            changes.push(change);
        }
        changes.sort_by(|a, b| a.asset.cmp(&b.asset));

        assert_eq!(changes.len(), 3);
        assert_eq!((changes[0].asset.as_str(), changes[0].new), ("BNB", dec!(4)));
        assert_eq!((changes[1].asset.as_str(), changes[1].new), ("ETH", dec!(0.2)));
        assert_eq!((changes[2].asset.as_str(), changes[2].old), ("USDT", dec!(100)));
        assert_eq!(ledger.get("USDT"), Decimal::ZERO);
        assert_eq!(ledger.subscriber_count("USDT"), 1);
    }

    #[tokio::test]
    async fn test_resync_keeps_newer_stream_value() {
        let ledger = ledger();
        ledger.initialize(&snapshot(10, &[("BNB", dec!(1))])).await;
        ledger.apply_update("BNB", dec!(5), 30).await;

        ledger.initialize(&snapshot(20, &[("BNB", dec!(3))])).await;
        assert_eq!(ledger.get("BNB"), dec!(5));
        assert_eq!(ledger.last_event_time("BNB"), Some(30));
    }

    #[tokio::test]
    async fn test_resync_keeps_newer_unsubscribed_asset_missing_from_snapshot() {
        let ledger = ledger();
        ledger.initialize(&snapshot(10, &[("USDT", dec!(100))])).await;
        ledger.apply_update("ETH", dec!(5), 30).await;

        ledger.initialize(&snapshot(20, &[("USDT", dec!(100))])).await;
        assert_eq!(ledger.get("ETH"), dec!(5));
        assert_eq!(ledger.last_event_time("ETH"), Some(30));

        // Not newer than the snapshot and nobody listening: gone.
        ledger.initialize(&snapshot(40, &[("USDT", dec!(100))])).await;
        assert_eq!(ledger.get("ETH"), Decimal::ZERO);
        assert_eq!(ledger.last_event_time("ETH"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_deliver_in_acceptance_order() {
        let ledger = Arc::new(ledger());
        let (tx, mut rx) = balance_channel(256);
        ledger.subscribe("BNB", tx);

        let mut handles = Vec::new();
        for t in 1..=64u64 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .apply_update("BNB", Decimal::from(t), t)
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut previous = Decimal::ZERO;
        let mut seen = 0;
        while let Ok(change) = rx.try_recv() {
            assert_eq!(change.old, previous, "notifications must chain");
            assert!(change.new > previous, "accepted event times only increase");
            previous = change.new;
            seen += 1;
        }
        assert!(seen >= 1);
        assert_eq!(ledger.get("BNB"), previous);
    }
}
