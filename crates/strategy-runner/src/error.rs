//! Strategy runtime error types.

use thiserror::Error;

/// Errors that can occur while building or running a strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// A config value is out of range.
    #[error("invalid `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The candle stream feeding the strategy ended.
    #[error("candle stream for {0} closed")]
    CandleStreamClosed(String),

    /// The ledger dropped the balance subscription.
    #[error("balance feed for {0} closed")]
    BalanceFeedClosed(String),
}

impl StrategyError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
