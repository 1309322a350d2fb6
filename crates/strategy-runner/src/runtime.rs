//! Per-symbol strategy runtime.

use std::sync::Arc;

use balance_ledger::{balance_channel, BalanceReceiver, SharedLedger};
use execution_core::{ExecutionError, FillSummary, SharedExecutor};
use model::{BalanceChange, Candle};
use notifier::SharedNotifier;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::StrategyConfig;
use crate::cooldown::CooldownGate;
use crate::cost_basis::{blend, PendingFill};
use crate::error::StrategyError;
use crate::sizing::{buy_amount, max_budget, truncate};
use crate::tiers::{SellTiers, TierHit, TierKind};

const DEFAULT_NOTIFY_CAPACITY: usize = 16;

/// Mutable state of a runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeState {
    /// Average purchase price of the held position; zero when unknown.
    pub cost_basis: Decimal,
    /// Current maximum quote budget.
    pub max_budget: Decimal,
    /// Profit realized by sells since start.
    pub realized_profit: Decimal,
}

/// Trades one symbol on candle updates.
///
/// Buys when a candle rises more than the trigger, sells part of the
/// position when the price reaches a profit or loss tier against the cost
/// basis. Buys and sells have separate cooldowns.
pub struct StrategyRuntime {
    config: StrategyConfig,
    symbol: String,
    quote_asset: String,
    min_trade_quote: Decimal,
    ledger: SharedLedger,
    executor: SharedExecutor,
    notifier: SharedNotifier,
    tiers: SellTiers,
    buy_gate: CooldownGate,
    sell_gate: CooldownGate,
    pending: PendingFill,
    state: Mutex<RuntimeState>,
    notify_capacity: usize,
}

impl StrategyRuntime {
    pub fn new(
        config: StrategyConfig,
        executor: SharedExecutor,
        ledger: SharedLedger,
        notifier: SharedNotifier,
    ) -> Result<Self, StrategyError> {
        config.validate()?;

        let quote_asset = executor.config().quote_asset.clone();
        let min_trade_quote = executor.config().min_trade_quote;
        let tiers = SellTiers::new(
            config.profit_point,
            config.loss_point,
            config.profit_tiers.clone(),
            config.loss_tiers.clone(),
        );
        let state = RuntimeState {
            cost_basis: config.initial_cost_basis.unwrap_or_default(),
            ..RuntimeState::default()
        };

        Ok(Self {
            symbol: config.symbol(&quote_asset),
            buy_gate: CooldownGate::new(config.buy_cooldown()),
            sell_gate: CooldownGate::new(config.sell_cooldown()),
            config,
            quote_asset,
            min_trade_quote,
            ledger,
            executor,
            notifier,
            tiers,
            pending: PendingFill::new(),
            state: Mutex::new(state),
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        })
    }

    /// Capacity of the balance notification channel.
    pub fn with_notify_capacity(mut self, capacity: usize) -> Self {
        self.notify_capacity = capacity;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> RuntimeState {
        self.state.lock().clone()
    }

    /// Run until the candle stream or the balance feed ends.
    ///
    /// Either ending is an error: a strategy is meant to run for the life of
    /// the process.
    pub async fn run(self: Arc<Self>, candles: mpsc::Receiver<Candle>) -> Result<(), StrategyError> {
        let span = info_span!("strategy", name = %self.config.name, symbol = %self.symbol);
        Err(self.run_inner(candles).instrument(span).await)
    }

    async fn run_inner(self: Arc<Self>, candles: mpsc::Receiver<Candle>) -> StrategyError {
        // One channel for both assets; it closes once both are unsubscribed.
        let (tx, balances) = balance_channel(self.notify_capacity);
        let base_id = self.ledger.subscribe(&self.config.base_asset, tx.clone());
        let quote_id = self.ledger.subscribe(&self.quote_asset, tx);

        let budget = self.refresh_budget();
        info!(
            max_budget = %budget,
            cost_basis = %self.state.lock().cost_basis,
            "Strategy started"
        );

        let error = tokio::select! {
            e = self.candle_loop(candles) => e,
            e = self.balance_loop(balances) => e,
        };

        self.ledger.unsubscribe(&self.config.base_asset, base_id);
        self.ledger.unsubscribe(&self.quote_asset, quote_id);
        error!(error = %error, "Strategy stopped");
        error
    }

    async fn candle_loop(&self, mut candles: mpsc::Receiver<Candle>) -> StrategyError {
        while let Some(candle) = candles.recv().await {
            self.on_candle(&candle).await;
        }
        StrategyError::CandleStreamClosed(self.symbol.clone())
    }

    async fn balance_loop(&self, mut balances: BalanceReceiver) -> StrategyError {
        while let Some(change) = balances.recv().await {
            self.on_balance_change(change).await;
        }
        StrategyError::BalanceFeedClosed(self.symbol.clone())
    }

    // ========================================================================
    // Candles
    // ========================================================================

    /// Evaluate one candle: sell check first, then buy check.
    pub async fn on_candle(&self, candle: &Candle) {
        self.check_sell(candle.close).await;
        self.check_buy(candle).await;
    }

    async fn check_buy(&self, candle: &Candle) {
        let Some(change) = candle.change_ratio() else {
            return;
        };
        if change <= self.config.buy_trigger {
            return;
        }
        if !self.buy_gate.try_arm() {
            debug!(change = %change, "Buy trigger during cooldown");
            return;
        }

        let budget = self.state.lock().max_budget;
        let amount = buy_amount(self.config.buy, budget, self.min_trade_quote);
        let amount = truncate(amount, self.config.quote_decimals);
        if amount <= Decimal::ZERO {
            info!(max_budget = %budget, "Buy triggered but budget too small");
            return;
        }

        info!(change = %change, amount = %amount, "Buy triggered");
        match self.executor.buy(&self.symbol, amount, budget).await {
            Ok(fill) => self.on_buy_filled(&fill).await,
            Err(e) => self.log_order_error("buy", &e),
        }
    }

    async fn on_buy_filled(&self, fill: &FillSummary) {
        let Some(avg_price) = fill.avg_price else {
            info!(order_id = fill.order_id, status = ?fill.status, "Buy acknowledged without fills");
            return;
        };
        if let Some(missed) = self.pending.set(avg_price) {
            info!(
                old = %missed.old,
                new = %missed.new,
                "Buy fill arrived after its balance increase"
            );
            self.apply_cost_basis(&missed, avg_price).await;
        }

        let message = format!(
            "{}: bought {} {} at avg price {}, total {} {}",
            self.config.name,
            fill.executed_qty.round_dp(3),
            self.config.base_asset,
            avg_price.round_dp(5),
            fill.quote_total.round_dp(5),
            self.quote_asset,
        );
        info!(order_id = fill.order_id, "{}", message);
        self.notifier.push(&message).await;
    }

    async fn check_sell(&self, close: Decimal) {
        let cost_basis = self.state.lock().cost_basis;
        if cost_basis <= Decimal::ZERO {
            return;
        }

        let profit_ratio = close / cost_basis - Decimal::ONE;
        let Some(hit) = self.tiers.select(profit_ratio) else {
            return;
        };

        let held = self.ledger.get(&self.config.base_asset);
        let quantity = held * hit.fraction;
        if quantity <= self.config.min_sell_qty {
            return;
        }
        if !self.sell_gate.try_arm() {
            debug!(profit_ratio = %profit_ratio, "Sell tier reached during cooldown");
            return;
        }

        let quantity = truncate(quantity, self.config.quantity_decimals);
        info!(
            profit_ratio = %profit_ratio,
            tier = %describe_tier(&hit),
            quantity = %quantity,
            "Sell triggered"
        );
        match self.executor.sell(&self.symbol, quantity).await {
            Ok(fill) => self.on_sell_filled(&fill, cost_basis, &hit).await,
            Err(e) => self.log_order_error("sell", &e),
        }
    }

    async fn on_sell_filled(&self, fill: &FillSummary, cost_basis: Decimal, hit: &TierHit) {
        let Some(avg_price) = fill.avg_price else {
            info!(order_id = fill.order_id, status = ?fill.status, "Sell acknowledged without fills");
            return;
        };

        let profit = (avg_price - cost_basis) * fill.executed_qty;
        let total = {
            let mut state = self.state.lock();
            state.realized_profit += profit;
            state.realized_profit
        };

        let message = format!(
            "{}: {} reached, sold {} {} at avg price {}, profit {}, total profit {}",
            self.config.name,
            describe_tier(hit),
            fill.executed_qty.round_dp(1),
            self.config.base_asset,
            avg_price.round_dp(3),
            profit.round_dp(3),
            total.round_dp(3),
        );
        info!(order_id = fill.order_id, "{}", message);
        self.notifier.push(&message).await;
    }

    fn log_order_error(&self, action: &str, error: &ExecutionError) {
        if error.is_local_rejection() {
            info!(action, error = %error, "Order not placed");
        } else {
            error!(action, error = %error, "Order failed");
        }
    }

    // ========================================================================
    // Balances
    // ========================================================================

    /// Recompute the maximum budget from the free quote balance.
    pub fn refresh_budget(&self) -> Decimal {
        let free = self.ledger.get(&self.quote_asset);
        let budget = max_budget(self.config.budget, free);
        self.state.lock().max_budget = budget;
        budget
    }

    /// React to a ledger notification for the base or quote asset.
    ///
    /// An increase of the base asset is attributed to the pending buy fill;
    /// if none arrives within the attribution timeout the cost basis stays
    /// as it is until that buy reports its price.
    pub async fn on_balance_change(&self, change: BalanceChange) {
        let budget = self.refresh_budget();
        debug!(
            asset = %change.asset,
            old = %change.old,
            new = %change.new,
            max_budget = %budget,
            "Balance changed"
        );

        if change.asset != self.config.base_asset || !change.is_increase() {
            return;
        }

        let timeout = self.config.fill_attribution_timeout();
        let Some(price) = self.pending.take_within(&change, timeout).await else {
            warn!(
                old = %change.old,
                new = %change.new,
                timeout_secs = timeout.as_secs(),
                "Balance increase without a buy fill, cost basis unchanged"
            );
            return;
        };
        self.apply_cost_basis(&change, price).await;
    }

    async fn apply_cost_basis(&self, change: &BalanceChange, price: Decimal) {
        let cost_basis = {
            let mut state = self.state.lock();
            state.cost_basis = blend(state.cost_basis, change.old, change.new, price);
            state.cost_basis
        };

        let message = format!(
            "{}: cost basis of {} is now {}, holding {}",
            self.config.name,
            self.config.base_asset,
            cost_basis.round_dp(5),
            change.new.round_dp(3),
        );
        info!("{}", message);
        self.notifier.push(&message).await;
    }
}

fn describe_tier(hit: &TierHit) -> String {
    match hit.kind {
        TierKind::TakeProfit => format!("take-profit x{}", hit.multiple),
        TierKind::StopLoss => format!("stop-loss x{}", hit.multiple),
    }
}
