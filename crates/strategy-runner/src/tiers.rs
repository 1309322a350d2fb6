//! Sell tier selection.

use rust_decimal::Decimal;

use crate::config::SellTier;

/// Which side of the cost basis triggered a sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    TakeProfit,
    StopLoss,
}

/// The tier a price move reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierHit {
    pub kind: TierKind,
    pub multiple: Decimal,
    /// Fraction of the held quantity to sell.
    pub fraction: Decimal,
}

/// Profit and loss tiers, scaled by their points.
///
/// Both comparisons are inclusive: a profit of exactly `multiple * profit_point`
/// reaches that tier, as does a loss of exactly `multiple * loss_point`. The
/// highest reached profit multiple wins, then the deepest loss multiple.
#[derive(Debug, Clone)]
pub struct SellTiers {
    profit_point: Decimal,
    loss_point: Decimal,
    profit: Vec<SellTier>,
    loss: Vec<SellTier>,
}

impl SellTiers {
    pub fn new(
        profit_point: Decimal,
        loss_point: Decimal,
        mut profit: Vec<SellTier>,
        mut loss: Vec<SellTier>,
    ) -> Self {
        profit.sort_by(|a, b| b.multiple.cmp(&a.multiple));
        loss.sort_by(|a, b| b.multiple.cmp(&a.multiple));
        Self {
            profit_point,
            loss_point,
            profit,
            loss,
        }
    }

    /// Tier reached by `profit_ratio` (`close / cost_basis - 1`), if any.
    pub fn select(&self, profit_ratio: Decimal) -> Option<TierHit> {
        let take_profit = self
            .profit
            .iter()
            .find(|tier| profit_ratio >= tier.multiple * self.profit_point)
            .map(|tier| TierHit {
                kind: TierKind::TakeProfit,
                multiple: tier.multiple,
                fraction: tier.fraction,
            });
        if take_profit.is_some() {
            return take_profit;
        }

        self.loss
            .iter()
            .find(|tier| profit_ratio <= -(tier.multiple * self.loss_point))
            .map(|tier| TierHit {
                kind: TierKind::StopLoss,
                multiple: tier.multiple,
                fraction: tier.fraction,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_loss_tiers, default_profit_tiers};
    use rust_decimal_macros::dec;

    fn tiers() -> SellTiers {
        SellTiers::new(
            dec!(0.05),
            dec!(0.05),
            default_profit_tiers(),
            default_loss_tiers(),
        )
    }

    fn fraction(profit_ratio: Decimal) -> Option<Decimal> {
        tiers().select(profit_ratio).map(|hit| hit.fraction)
    }

    #[test]
    fn test_highest_profit_tier_wins() {
        let hit = tiers().select(dec!(0.16)).unwrap();
        assert_eq!(hit.kind, TierKind::TakeProfit);
        assert_eq!(hit.multiple, dec!(3));
        assert_eq!(hit.fraction, dec!(0.95));
    }

    #[test]
    fn test_profit_boundaries_are_inclusive() {
        assert_eq!(fraction(dec!(0.05)), Some(dec!(0.6)));
        assert_eq!(fraction(dec!(0.10)), Some(dec!(0.7)));
        assert_eq!(fraction(dec!(0.15)), Some(dec!(0.95)));
    }

    #[test]
    fn test_loss_boundaries_are_inclusive() {
        assert_eq!(fraction(dec!(-0.05)), Some(dec!(0.8)));
        assert_eq!(fraction(dec!(-0.075)), Some(dec!(1)));
        assert_eq!(tiers().select(dec!(-0.2)).unwrap().kind, TierKind::StopLoss);
    }

    #[test]
    fn test_quiet_band_selects_nothing() {
        assert_eq!(fraction(dec!(0.049)), None);
        assert_eq!(fraction(dec!(0)), None);
        assert_eq!(fraction(dec!(-0.049)), None);
    }

    #[test]
    fn test_tier_order_in_config_does_not_matter() {
        let tiers = SellTiers::new(
            dec!(0.05),
            dec!(0.05),
            vec![
                SellTier::new(dec!(1), dec!(0.6)),
                SellTier::new(dec!(3), dec!(0.95)),
            ],
            vec![],
        );
        assert_eq!(tiers.select(dec!(0.2)).unwrap().fraction, dec!(0.95));
        assert_eq!(tiers.select(dec!(-0.5)), None);
    }
}
