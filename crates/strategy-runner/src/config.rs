//! Per-strategy configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::error::StrategyError;

/// A quote amount given either relative to a reference or as a fixed number.
///
/// In TOML: `{ fraction = 0.2 }` or `{ quote = 50 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Amount {
    Fraction(Decimal),
    Quote(Decimal),
}

impl Amount {
    fn validate(&self, field: &'static str) -> Result<(), StrategyError> {
        match *self {
            Amount::Fraction(f) if f <= Decimal::ZERO || f > Decimal::ONE => Err(
                StrategyError::invalid(field, format!("fraction {} outside (0, 1]", f)),
            ),
            Amount::Quote(q) if q <= Decimal::ZERO => Err(StrategyError::invalid(
                field,
                format!("quote amount {} must be positive", q),
            )),
            _ => Ok(()),
        }
    }
}

/// Sell `fraction` of the position once the price moved `multiple` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SellTier {
    pub multiple: Decimal,
    pub fraction: Decimal,
}

impl SellTier {
    pub fn new(multiple: Decimal, fraction: Decimal) -> Self {
        Self { multiple, fraction }
    }
}

/// Configuration of one symbol strategy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategyConfig {
    /// Name used in logs and notifications.
    pub name: String,
    /// Traded asset, e.g. `BNB`. The symbol is this plus the quote asset.
    pub base_asset: String,
    #[serde(default = "default_kline_interval")]
    pub kline_interval: String,
    /// Maximum quote budget, relative to the free quote balance or fixed.
    pub budget: Amount,
    /// Quote spent per buy, relative to the budget or fixed.
    pub buy: Amount,
    /// Buy when `close / open - 1` exceeds this.
    pub buy_trigger: Decimal,
    #[serde(default = "default_cooldown_secs")]
    pub buy_cooldown_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub sell_cooldown_secs: u64,
    pub profit_point: Decimal,
    pub loss_point: Decimal,
    #[serde(default = "default_profit_tiers")]
    pub profit_tiers: Vec<SellTier>,
    #[serde(default = "default_loss_tiers")]
    pub loss_tiers: Vec<SellTier>,
    /// Sells at or below this quantity are skipped.
    #[serde(default = "default_min_sell_qty")]
    pub min_sell_qty: Decimal,
    #[serde(default = "default_quantity_decimals")]
    pub quantity_decimals: u32,
    #[serde(default = "default_quote_decimals")]
    pub quote_decimals: u32,
    /// Cost basis of a position held before start.
    #[serde(default)]
    pub initial_cost_basis: Option<Decimal>,
    /// How long a balance increase waits for its buy fill price.
    #[serde(default = "default_fill_attribution_timeout_secs")]
    pub fill_attribution_timeout_secs: u64,
}

fn default_kline_interval() -> String {
    "1m".to_string()
}

fn default_cooldown_secs() -> u64 {
    60
}

pub fn default_profit_tiers() -> Vec<SellTier> {
    vec![
        SellTier::new(dec!(3), dec!(0.95)),
        SellTier::new(dec!(2), dec!(0.7)),
        SellTier::new(dec!(1), dec!(0.6)),
    ]
}

pub fn default_loss_tiers() -> Vec<SellTier> {
    vec![
        SellTier::new(dec!(1.5), dec!(1)),
        SellTier::new(dec!(1), dec!(0.8)),
    ]
}

fn default_min_sell_qty() -> Decimal {
    dec!(0.1)
}

fn default_quantity_decimals() -> u32 {
    1
}

fn default_quote_decimals() -> u32 {
    3
}

fn default_fill_attribution_timeout_secs() -> u64 {
    45
}

impl StrategyConfig {
    /// Config with default tiers, cooldowns and precision.
    pub fn new(
        name: impl Into<String>,
        base_asset: impl Into<String>,
        budget: Amount,
        buy: Amount,
        buy_trigger: Decimal,
        profit_point: Decimal,
        loss_point: Decimal,
    ) -> Self {
        Self {
            name: name.into(),
            base_asset: base_asset.into(),
            kline_interval: default_kline_interval(),
            budget,
            buy,
            buy_trigger,
            buy_cooldown_secs: default_cooldown_secs(),
            sell_cooldown_secs: default_cooldown_secs(),
            profit_point,
            loss_point,
            profit_tiers: default_profit_tiers(),
            loss_tiers: default_loss_tiers(),
            min_sell_qty: default_min_sell_qty(),
            quantity_decimals: default_quantity_decimals(),
            quote_decimals: default_quote_decimals(),
            initial_cost_basis: None,
            fill_attribution_timeout_secs: default_fill_attribution_timeout_secs(),
        }
    }

    pub fn with_cooldowns(mut self, buy_secs: u64, sell_secs: u64) -> Self {
        self.buy_cooldown_secs = buy_secs;
        self.sell_cooldown_secs = sell_secs;
        self
    }

    pub fn with_initial_cost_basis(mut self, cost_basis: Decimal) -> Self {
        self.initial_cost_basis = Some(cost_basis);
        self
    }

    pub fn symbol(&self, quote_asset: &str) -> String {
        format!("{}{}", self.base_asset, quote_asset)
    }

    pub fn buy_cooldown(&self) -> Duration {
        Duration::from_secs(self.buy_cooldown_secs)
    }

    pub fn sell_cooldown(&self) -> Duration {
        Duration::from_secs(self.sell_cooldown_secs)
    }

    pub fn fill_attribution_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_attribution_timeout_secs)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.name.trim().is_empty() {
            return Err(StrategyError::invalid("name", "must not be empty"));
        }
        if self.base_asset.trim().is_empty() {
            return Err(StrategyError::invalid("base_asset", "must not be empty"));
        }
        if self.kline_interval.trim().is_empty() {
            return Err(StrategyError::invalid("kline_interval", "must not be empty"));
        }
        self.budget.validate("budget")?;
        self.buy.validate("buy")?;
        if self.buy_cooldown_secs == 0 {
            return Err(StrategyError::invalid("buy_cooldown_secs", "must be positive"));
        }
        if self.sell_cooldown_secs == 0 {
            return Err(StrategyError::invalid("sell_cooldown_secs", "must be positive"));
        }
        if self.profit_point <= Decimal::ZERO {
            return Err(StrategyError::invalid("profit_point", "must be positive"));
        }
        if self.loss_point <= Decimal::ZERO {
            return Err(StrategyError::invalid("loss_point", "must be positive"));
        }
        validate_tiers("profit_tiers", &self.profit_tiers)?;
        validate_tiers("loss_tiers", &self.loss_tiers)?;
        if self.min_sell_qty < Decimal::ZERO {
            return Err(StrategyError::invalid("min_sell_qty", "must not be negative"));
        }
        if let Some(cost_basis) = self.initial_cost_basis {
            if cost_basis < Decimal::ZERO {
                return Err(StrategyError::invalid(
                    "initial_cost_basis",
                    "must not be negative",
                ));
            }
        }
        Ok(())
    }
}

fn validate_tiers(field: &'static str, tiers: &[SellTier]) -> Result<(), StrategyError> {
    for tier in tiers {
        if tier.multiple <= Decimal::ZERO {
            return Err(StrategyError::invalid(
                field,
                format!("multiple {} must be positive", tier.multiple),
            ));
        }
        if tier.fraction <= Decimal::ZERO || tier.fraction > Decimal::ONE {
            return Err(StrategyError::invalid(
                field,
                format!("fraction {} outside (0, 1]", tier.fraction),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StrategyConfig {
        StrategyConfig::new(
            "bnb-momentum",
            "BNB",
            Amount::Fraction(dec!(0.5)),
            Amount::Quote(dec!(20)),
            dec!(0.01),
            dec!(0.05),
            dec!(0.05),
        )
    }

    #[test]
    fn test_defaults_from_json() {
        let json = r#"{
            "name": "bnb",
            "base_asset": "BNB",
            "budget": {"fraction": "0.5"},
            "buy": {"quote": "20"},
            "buy_trigger": "0.01",
            "profit_point": "0.05",
            "loss_point": "0.03"
        }"#;

        let config: StrategyConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.budget, Amount::Fraction(dec!(0.5)));
        assert_eq!(config.buy, Amount::Quote(dec!(20)));
        assert_eq!(config.kline_interval, "1m");
        assert_eq!(config.buy_cooldown(), Duration::from_secs(60));
        assert_eq!(config.profit_tiers, default_profit_tiers());
        assert_eq!(config.loss_tiers, default_loss_tiers());
        assert_eq!(config.min_sell_qty, dec!(0.1));
        assert_eq!((config.quantity_decimals, config.quote_decimals), (1, 3));
        assert_eq!(config.initial_cost_basis, None);
        assert_eq!(config.fill_attribution_timeout(), Duration::from_secs(45));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_symbol() {
        assert_eq!(config().symbol("USDT"), "BNBUSDT");
    }

    #[test]
    fn test_rejects_fraction_above_one() {
        let mut config = config();
        config.budget = Amount::Fraction(dec!(1.5));

        match config.validate() {
            Err(StrategyError::InvalidConfig { field, .. }) => assert_eq!(field, "budget"),
            other => panic!("Expected invalid budget, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_zero_cooldown() {
        let config = config().with_cooldowns(0, 60);
        assert!(matches!(
            config.validate(),
            Err(StrategyError::InvalidConfig {
                field: "buy_cooldown_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_non_positive_tier_multiple() {
        let mut config = config();
        config.loss_tiers = vec![SellTier::new(dec!(0), dec!(1))];
        assert!(matches!(
            config.validate(),
            Err(StrategyError::InvalidConfig {
                field: "loss_tiers",
                ..
            })
        ));
    }
}
