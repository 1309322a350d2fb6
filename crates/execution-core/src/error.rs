use exchange_core::ExchangeError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from order submission.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Rejected locally; nothing was sent to the exchange.
    #[error("buy budget {budget} is at or below the minimum trade size {minimum}")]
    BudgetBelowMinimum { budget: Decimal, minimum: Decimal },

    /// Rejected locally; nothing was sent to the exchange.
    #[error("order amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl ExecutionError {
    /// True when the order never left the process.
    pub fn is_local_rejection(&self) -> bool {
        !matches!(self, Self::Exchange(_))
    }
}
