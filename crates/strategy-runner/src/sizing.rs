//! Budget and order sizing.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::Amount;

/// Maximum quote budget given the free quote balance.
///
/// A fixed budget is capped at what is actually free.
pub fn max_budget(budget: Amount, free_quote: Decimal) -> Decimal {
    match budget {
        Amount::Fraction(fraction) if free_quote > Decimal::ZERO => free_quote * fraction,
        Amount::Fraction(_) => Decimal::ZERO,
        Amount::Quote(amount) => amount.min(free_quote.max(Decimal::ZERO)),
    }
}

/// Quote amount of the next buy, or zero when no buy is possible.
///
/// Relative amounts are floored at `min_trade`. A budget below `min_trade`
/// or a fixed amount below it yields zero.
pub fn buy_amount(buy: Amount, max_budget: Decimal, min_trade: Decimal) -> Decimal {
    if max_budget < min_trade {
        return Decimal::ZERO;
    }
    match buy {
        Amount::Quote(amount) if amount < min_trade => Decimal::ZERO,
        Amount::Quote(amount) => amount,
        Amount::Fraction(fraction) => (max_budget * fraction).max(min_trade),
    }
}

/// Cut `value` to `decimals` places, never rounding up.
pub fn truncate(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}
