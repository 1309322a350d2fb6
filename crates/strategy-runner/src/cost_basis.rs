//! Cost-basis accounting.
//!
//! A buy fill leaves its average price in a [`PendingFill`]. The balance
//! increase it causes arrives separately through the ledger and consumes
//! that price to [`blend`] it into the running average. Only one buy per
//! symbol may be unattributed at a time.

use std::time::Duration;

use model::BalanceChange;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Blend a purchase into the average cost of a position.
///
/// `old` and `new` are the held quantities around the purchase. A zero
/// average means no known cost yet, so the purchase price is taken as is.
pub fn blend(avg: Decimal, old: Decimal, new: Decimal, price: Decimal) -> Decimal {
    if avg.is_zero() || new.is_zero() {
        return price;
    }
    (avg * old + price * (new - old)) / new
}

#[derive(Debug, Default)]
struct Slot {
    price: Option<Decimal>,
    /// Listeners currently blocked in `take_within`.
    waiting: usize,
    /// Last increase whose wait ran out before a price arrived.
    missed: Option<BalanceChange>,
}

/// Single-slot hand-off of a buy fill price to the balance listener.
///
/// A price is consumed by exactly one increase. When an increase gave up
/// waiting, the next price set belongs to that increase and is handed back
/// by [`PendingFill::set`] instead of being stored, so it can never be
/// picked up by a later, unrelated increase.
#[derive(Debug, Default)]
pub struct PendingFill {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl PendingFill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a fill price.
    ///
    /// A listener that is waiting right now takes it. Otherwise, if an
    /// earlier increase timed out waiting, that increase is returned and
    /// the price is not kept. Otherwise the price is stored, replacing an
    /// unconsumed one.
    pub fn set(&self, price: Decimal) -> Option<BalanceChange> {
        let mut slot = self.slot.lock();
        if slot.waiting == 0 {
            if let Some(missed) = slot.missed.take() {
                return Some(missed);
            }
        }
        slot.price = Some(price);
        drop(slot);
        self.notify.notify_one();
        None
    }

    /// Take the pending price for `change`, waiting at most `timeout` for
    /// one to be set. On timeout `change` is remembered as missed.
    pub async fn take_within(&self, change: &BalanceChange, timeout: Duration) -> Option<Decimal> {
        let deadline = Instant::now() + timeout;
        self.slot.lock().waiting += 1;
        let price = loop {
            let notified = self.notify.notified();
            if let Some(price) = self.slot.lock().price.take() {
                break Some(price);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break None;
            }
        };

        let mut slot = self.slot.lock();
        slot.waiting -= 1;
        let price = price.or_else(|| slot.price.take());
        match price {
            Some(_) => slot.missed = None,
            None => slot.missed = Some(change.clone()),
        }
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_blend_sequence() {
        let avg = blend(dec!(0), dec!(0), dec!(5), dec!(100));
        assert_eq!(avg, dec!(100));

        let avg = blend(avg, dec!(5), dec!(8), dec!(110));
        assert_eq!(avg, dec!(103.75));
    }

    #[test]
    fn test_first_purchase_on_existing_position_takes_price() {
        assert_eq!(blend(dec!(0), dec!(2), dec!(3), dec!(50)), dec!(50));
    }

    fn increase(old: Decimal, new: Decimal) -> BalanceChange {
        BalanceChange {
            asset: "BNB".into(),
            old,
            new,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_returns_already_set_price() {
        let pending = PendingFill::new();
        assert_eq!(pending.set(dec!(101)), None);

        let change = increase(dec!(0), dec!(1));
        assert_eq!(
            pending.take_within(&change, Duration::from_secs(1)).await,
            Some(dec!(101))
        );
        assert_eq!(pending.take_within(&change, Duration::from_secs(1)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_waits_for_late_price() {
        let pending = Arc::new(PendingFill::new());
        let setter = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(setter.set(dec!(99.5)), None);
        });

        assert_eq!(
            pending
                .take_within(&increase(dec!(0), dec!(1)), Duration::from_secs(10))
                .await,
            Some(dec!(99.5))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_times_out_without_price() {
        let pending = PendingFill::new();
        let started = Instant::now();

        assert_eq!(
            pending
                .take_within(&increase(dec!(0), dec!(1)), Duration::from_secs(10))
                .await,
            None
        );
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_after_timeout_goes_to_missed_increase() {
        let pending = PendingFill::new();
        let missed = increase(dec!(1), dec!(1.5));
        assert_eq!(pending.take_within(&missed, Duration::from_secs(10)).await, None);

        assert_eq!(pending.set(dec!(110)), Some(missed));

        // Nothing is left behind for the next increase.
        let transfer = increase(dec!(1.5), dec!(3));
        assert_eq!(pending.take_within(&transfer, Duration::from_secs(10)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_listener_takes_precedence_over_missed_increase() {
        let pending = Arc::new(PendingFill::new());
        let missed = increase(dec!(1), dec!(2));
        assert_eq!(pending.take_within(&missed, Duration::from_secs(10)).await, None);

        let setter = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert_eq!(setter.set(dec!(50)), None);
        });

        let current = increase(dec!(2), dec!(4));
        assert_eq!(
            pending.take_within(&current, Duration::from_secs(10)).await,
            Some(dec!(50))
        );
        // The older miss is settled once a later increase was attributed.
        assert_eq!(pending.set(dec!(60)), None);
    }
}
