use std::sync::Arc;
use std::time::Duration;

use balance_ledger::SharedLedger;
use exchange_core::{ExchangeApi, OrderRequest, OrderSide, Sizing};
use metrics::SharedMetrics;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::fills::FillSummary;
use crate::watchdog::arm_watchdog;

/// Generate a unique client order ID with a prefix.
///
/// Format: `{prefix}_{uuid}` where uuid is a v4 UUID in simple format (no hyphens).
pub fn generate_client_order_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().as_simple())
}

/// Execution settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Delay before an unfilled order is checked and cancelled.
    pub watchdog_delay_secs: u64,
    /// Smallest quote amount worth trading.
    pub min_trade_quote: Decimal,
    /// Asset every traded symbol is quoted in.
    pub quote_asset: String,
    /// Prefix of generated client order ids.
    pub client_order_prefix: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            watchdog_delay_secs: 60,
            min_trade_quote: Decimal::TEN,
            quote_asset: "USDT".to_string(),
            client_order_prefix: "qb".to_string(),
        }
    }
}

impl ExecutionConfig {
    pub fn watchdog_delay(&self) -> Duration {
        Duration::from_secs(self.watchdog_delay_secs)
    }
}

/// Submits market orders and supervises the ones that do not fill at once.
///
/// Orders are never retried here; the caller decides what a failure means.
pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeApi>,
    ledger: SharedLedger,
    config: ExecutionConfig,
    metrics: SharedMetrics,
}

pub type SharedExecutor = Arc<OrderExecutor>;

impl OrderExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        ledger: SharedLedger,
        config: ExecutionConfig,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            exchange,
            ledger,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Spend `quote_amount` of the quote asset on `symbol`.
    ///
    /// `budget` is the caller's current buying budget. At or below the
    /// minimum trade size the order is rejected without contacting the
    /// exchange.
    pub async fn buy(
        &self,
        symbol: &str,
        quote_amount: Decimal,
        budget: Decimal,
    ) -> Result<FillSummary, ExecutionError> {
        if budget <= self.config.min_trade_quote {
            return Err(ExecutionError::BudgetBelowMinimum {
                budget,
                minimum: self.config.min_trade_quote,
            });
        }
        self.submit_order(symbol, OrderSide::Buy, Sizing::Quote(quote_amount))
            .await
    }

    /// Sell `quantity` of the base asset of `symbol`.
    pub async fn sell(&self, symbol: &str, quantity: Decimal) -> Result<FillSummary, ExecutionError> {
        self.submit_order(symbol, OrderSide::Sell, Sizing::Base(quantity))
            .await
    }

    /// Sell the whole free balance of `asset`. `Ok(None)` when there is nothing to sell.
    pub async fn sell_all(
        &self,
        symbol: &str,
        asset: &str,
    ) -> Result<Option<FillSummary>, ExecutionError> {
        let quantity = self.ledger.get(asset);
        if quantity <= Decimal::ZERO {
            return Ok(None);
        }
        self.sell(symbol, quantity).await.map(Some)
    }

    /// Submit a market order.
    ///
    /// An order not filled on acknowledgment arms the watchdog, which runs
    /// independently of this call.
    pub async fn submit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        sizing: Sizing,
    ) -> Result<FillSummary, ExecutionError> {
        if sizing.amount() <= Decimal::ZERO {
            return Err(ExecutionError::InvalidAmount(sizing.amount()));
        }

        let request = OrderRequest {
            symbol: symbol.to_string(),
            side,
            sizing,
            client_order_id: generate_client_order_id(&self.config.client_order_prefix),
        };

        let ack = match self.exchange.place_market_order(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(
                    client_order_id = %request.client_order_id,
                    symbol = %symbol,
                    side = ?side,
                    error = %e,
                    "Order rejected"
                );
                self.metrics.inc_order_failures();
                return Err(e.into());
            }
        };
        self.metrics.inc_orders_submitted();

        let summary = FillSummary::from_ack(&ack);
        info!(
            client_order_id = %request.client_order_id,
            order_id = summary.order_id,
            symbol = %symbol,
            side = ?side,
            status = ?summary.status,
            executed_qty = %summary.executed_qty,
            avg_price = ?summary.avg_price,
            "Order placed"
        );

        if !summary.is_filled() {
            arm_watchdog(
                self.exchange.clone(),
                symbol.to_string(),
                summary.order_id,
                self.config.watchdog_delay(),
                self.metrics.clone(),
            );
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::WatchdogOutcome;
    use async_trait::async_trait;
    use balance_ledger::{BalanceLedger, LedgerConfig};
    use exchange_core::{ExchangeError, Fill, OrderAck, OrderStatus};
    use metrics::create_metrics;
    use model::AccountSnapshot;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    struct FakeExchange {
        ack: Mutex<Result<OrderAck, ExchangeError>>,
        status: Mutex<Result<OrderStatus, ExchangeError>>,
        orders: Mutex<Vec<OrderRequest>>,
        queries: Mutex<u32>,
        cancels: Mutex<Vec<u64>>,
    }

    impl FakeExchange {
        fn new(ack_status: OrderStatus, later_status: OrderStatus) -> Arc<Self> {
            Arc::new(Self {
                ack: Mutex::new(Ok(OrderAck {
                    order_id: 7,
                    status: ack_status,
                    fills: vec![Fill {
                        price: dec!(300),
                        qty: dec!(0.05),
                    }],
                })),
                status: Mutex::new(Ok(later_status)),
                orders: Mutex::new(Vec::new()),
                queries: Mutex::new(0),
                cancels: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExchangeApi for FakeExchange {
        async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError> {
            Ok(AccountSnapshot::default())
        }

        async fn place_market_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
            self.orders.lock().push(request.clone());
            self.ack.lock().clone()
        }

        async fn query_order(&self, _: &str, _: u64) -> Result<OrderStatus, ExchangeError> {
            *self.queries.lock() += 1;
            self.status.lock().clone()
        }

        async fn cancel_order(&self, _: &str, order_id: u64) -> Result<(), ExchangeError> {
            self.cancels.lock().push(order_id);
            Ok(())
        }

        async fn start_session(&self) -> Result<String, ExchangeError> {
            Ok("lease".into())
        }

        async fn renew_session(&self, _: &str) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn close_session(&self, _: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
    }

    fn executor(exchange: Arc<FakeExchange>) -> (OrderExecutor, SharedLedger, SharedMetrics) {
        let ledger = Arc::new(BalanceLedger::new(LedgerConfig::default()));
        let metrics = create_metrics();
        let executor = OrderExecutor::new(
            exchange,
            ledger.clone(),
            ExecutionConfig::default(),
            metrics.clone(),
        );
        (executor, ledger, metrics)
    }

    #[test]
    fn test_generate_client_order_id() {
        let id1 = generate_client_order_id("qb");
        let id2 = generate_client_order_id("qb");

        assert!(id1.starts_with("qb_"));
        assert_eq!(id1.len(), "qb_".len() + 32);
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn test_buy_below_minimum_is_local() {
        let exchange = FakeExchange::new(OrderStatus::Filled, OrderStatus::Filled);
        let (executor, _, _) = executor(exchange.clone());

        let err = executor.buy("BNBUSDT", dec!(10), dec!(10)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::BudgetBelowMinimum { .. }));
        assert!(err.is_local_rejection());

        let err = executor.buy("BNBUSDT", dec!(10), dec!(4)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::BudgetBelowMinimum { .. }));
        assert!(exchange.orders.lock().is_empty());
    }

    #[tokio::test]
    async fn test_buy_sends_quote_sizing() {
        let exchange = FakeExchange::new(OrderStatus::Filled, OrderStatus::Filled);
        let (executor, _, metrics) = executor(exchange.clone());

        let summary = executor.buy("BNBUSDT", dec!(15), dec!(200)).await.unwrap();
        assert_eq!(summary.avg_price, Some(dec!(300)));

        let orders = exchange.orders.lock();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].sizing, Sizing::Quote(dec!(15)));
        assert!(orders[0].client_order_id.starts_with("qb_"));
        assert_eq!(metrics.orders_submitted(), 1);
    }

    #[tokio::test]
    async fn test_exchange_error_is_returned_without_retry() {
        let exchange = FakeExchange::new(OrderStatus::Filled, OrderStatus::Filled);
        *exchange.ack.lock() = Err(ExchangeError::InsufficientBalance);
        let (executor, _, metrics) = executor(exchange.clone());

        let err = executor.sell("BNBUSDT", dec!(1)).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Exchange(ExchangeError::InsufficientBalance)
        ));
        assert_eq!(exchange.orders.lock().len(), 1);
        assert_eq!(metrics.order_failures(), 1);
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let exchange = FakeExchange::new(OrderStatus::Filled, OrderStatus::Filled);
        let (executor, _, _) = executor(exchange.clone());

        let err = executor.sell("BNBUSDT", dec!(0)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidAmount(_)));
        assert!(exchange.orders.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sell_all_uses_ledger_balance() {
        let exchange = FakeExchange::new(OrderStatus::Filled, OrderStatus::Filled);
        let (executor, ledger, _) = executor(exchange.clone());

        assert_eq!(executor.sell_all("BNBUSDT", "BNB").await.unwrap(), None);
        assert!(exchange.orders.lock().is_empty());

        ledger.apply_update("BNB", dec!(2.5), 1).await;
        let summary = executor.sell_all("BNBUSDT", "BNB").await.unwrap();
        assert!(summary.is_some());
        assert_eq!(exchange.orders.lock()[0].sizing, Sizing::Base(dec!(2.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_cancels_partially_filled_once() {
        let exchange = FakeExchange::new(OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled);
        let (executor, _, metrics) = executor(exchange.clone());

        executor.buy("BNBUSDT", dec!(15), dec!(200)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(*exchange.queries.lock(), 0);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(exchange.cancels.lock().as_slice(), [7]);
        assert_eq!(metrics.watchdog_cancels(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_leaves_filled_order_alone() {
        let exchange = FakeExchange::new(OrderStatus::New, OrderStatus::Filled);
        let (executor, _, _) = executor(exchange.clone());

        executor.buy("BNBUSDT", dec!(15), dec!(200)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(*exchange.queries.lock(), 1);
        assert!(exchange.cancels.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_filled_on_ack_arms_no_watchdog() {
        let exchange = FakeExchange::new(OrderStatus::Filled, OrderStatus::New);
        let (executor, _, _) = executor(exchange.clone());

        executor.buy("BNBUSDT", dec!(15), dec!(200)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(*exchange.queries.lock(), 0);
        assert!(exchange.cancels.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_query_failure_is_only_counted() {
        let exchange = FakeExchange::new(OrderStatus::New, OrderStatus::New);
        *exchange.status.lock() = Err(ExchangeError::Transport("timeout".into()));
        let metrics = create_metrics();

        let outcome = arm_watchdog(
            exchange.clone(),
            "BNBUSDT".into(),
            7,
            Duration::from_secs(60),
            metrics.clone(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WatchdogOutcome::QueryFailed);
        assert!(exchange.cancels.lock().is_empty());
        assert_eq!(metrics.watchdog_errors(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_cancels_expired_remainder() {
        let exchange = FakeExchange::new(OrderStatus::New, OrderStatus::Expired);
        let outcome = arm_watchdog(
            exchange.clone(),
            "BNBUSDT".into(),
            7,
            Duration::from_secs(60),
            create_metrics(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WatchdogOutcome::Cancelled);
    }
}
