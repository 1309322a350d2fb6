//! Per-symbol trading strategies.
//!
//! A [`StrategyRuntime`] consumes the candle stream of one symbol and the
//! ledger's balance notifications for its base and quote assets:
//!
//! ```text
//! candles ──> sell check ──> buy check ──> OrderExecutor
//!                                              │ fill price
//!                                              v
//! ledger ──> balance listener ──> PendingFill ──> cost basis
//! ```

mod config;
mod cooldown;
mod cost_basis;
mod error;
mod runtime;
mod sizing;
mod tiers;

pub use config::{default_loss_tiers, default_profit_tiers, Amount, SellTier, StrategyConfig};
pub use cooldown::CooldownGate;
pub use cost_basis::{blend, PendingFill};
pub use error::StrategyError;
pub use runtime::{RuntimeState, StrategyRuntime};
pub use sizing::{buy_amount, max_budget, truncate};
pub use tiers::{SellTiers, TierHit, TierKind};
