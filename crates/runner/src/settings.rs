//! Application configuration.
//!
//! A TOML file layered with `QUANT_`-prefixed environment variables, e.g.
//! `QUANT_EXCHANGE__ENVIRONMENT=testnet` or `QUANT_LOGGING__FILTER=debug`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use account_stream::StreamConfig;
use balance_ledger::LedgerConfig;
use binance_rest::REQUEST_TIMEOUT;
use common::BinanceEnvironment;
use config::{Config, Environment, File, FileFormat};
use execution_core::ExecutionConfig;
use notifier::BarkConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use strategy_runner::{StrategyConfig, StrategyError};
use thiserror::Error;

const ENV_PREFIX: &str = "QUANT";

/// Binance lease lifetime; renewals must come well before it.
const LEASE_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no strategies configured")]
    NoStrategies,

    #[error("duplicate strategy name `{0}`")]
    DuplicateStrategy(String),

    #[error("strategy `{name}`: {source}")]
    Strategy {
        name: String,
        #[source]
        source: StrategyError,
    },

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Exchange access.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExchangeSection {
    pub environment: BinanceEnvironment,
    /// Falls back to `BINANCE_API_KEY` when unset.
    pub api_key: Option<String>,
    /// Falls back to `BINANCE_SECRET_KEY` when unset.
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Directory for daily JSON log files.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifierSection {
    pub bark: Option<BarkConfig>,
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub notifier: NotifierSection,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl AppConfig {
    /// Load `path` plus environment overrides, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Self::finish(config)
    }

    /// Parse a TOML document without environment overrides.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }

        let mut names = HashSet::new();
        for strategy in &self.strategies {
            if !names.insert(strategy.name.as_str()) {
                return Err(ConfigError::DuplicateStrategy(strategy.name.clone()));
            }
            strategy.validate().map_err(|source| ConfigError::Strategy {
                name: strategy.name.clone(),
                source,
            })?;
            // A buy response may take as long as the request timeout; the
            // balance increase must still be waiting for it.
            if strategy.fill_attribution_timeout() <= REQUEST_TIMEOUT {
                return Err(invalid(
                    "strategies.fill_attribution_timeout_secs",
                    format!(
                        "`{}` must wait longer than the {}s order request timeout",
                        strategy.name,
                        REQUEST_TIMEOUT.as_secs()
                    ),
                ));
            }
        }

        if self.execution.min_trade_quote <= Decimal::ZERO {
            return Err(invalid("execution.min_trade_quote", "must be positive"));
        }
        if self.execution.watchdog_delay_secs == 0 {
            return Err(invalid("execution.watchdog_delay_secs", "must be positive"));
        }
        if self.execution.quote_asset.trim().is_empty() {
            return Err(invalid("execution.quote_asset", "must not be empty"));
        }
        if self.stream.lease_renewal_secs == 0 || self.stream.lease_renewal_secs >= LEASE_LIFETIME_SECS
        {
            return Err(invalid(
                "stream.lease_renewal_secs",
                format!("must be between 1 and {}", LEASE_LIFETIME_SECS - 1),
            ));
        }
        if self.stream.backoff.base_ms == 0 {
            return Err(invalid("stream.backoff.base_ms", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.stream.backoff.jitter) {
            return Err(invalid("stream.backoff.jitter", "must be in [0, 1)"));
        }
        if self.ledger.notify_capacity == 0 {
            return Err(invalid("ledger.notify_capacity", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balance_ledger::BackpressurePolicy;
    use rust_decimal_macros::dec;
    use strategy_runner::Amount;

    const MINIMAL: &str = r#"
        [[strategies]]
        name = "bnb"
        base_asset = "BNB"
        budget = { fraction = 0.5 }
        buy = { quote = 20 }
        buy_trigger = 0.01
        profit_point = 0.05
        loss_point = 0.03
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.exchange.environment, BinanceEnvironment::Production);
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.stream.lease_renewal_secs, 1800);
        assert_eq!(config.execution.watchdog_delay_secs, 60);
        assert_eq!(config.execution.quote_asset, "USDT");
        assert_eq!(config.ledger.notify_capacity, 16);
        assert_eq!(config.ledger.backpressure, BackpressurePolicy::Block);
        assert!(config.notifier.bark.is_none());

        let strategy = &config.strategies[0];
        assert_eq!(strategy.budget, Amount::Fraction(dec!(0.5)));
        assert_eq!(strategy.buy, Amount::Quote(dec!(20)));
        assert_eq!(strategy.symbol(&config.execution.quote_asset), "BNBUSDT");
    }

    #[test]
    fn test_sections_override_defaults() {
        let toml = format!(
            r#"
            [exchange]
            environment = "testnet"

            [ledger]
            backpressure = "drop_newest"

            [stream.backoff]
            base_ms = 500

            [notifier.bark]
            url = "https://api.day.app"
            token = "abc"
            {}
            "#,
            MINIMAL
        );

        let config = AppConfig::from_toml(&toml).unwrap();

        assert_eq!(config.exchange.environment, BinanceEnvironment::Testnet);
        assert_eq!(config.ledger.backpressure, BackpressurePolicy::DropNewest);
        assert_eq!(config.stream.backoff.base_ms, 500);
        assert_eq!(config.stream.backoff.max_ms, 60_000);
        assert_eq!(config.notifier.bark.unwrap().token, "abc");
    }

    #[test]
    fn test_empty_strategy_list_rejected() {
        let result = AppConfig::from_toml("[exchange]\nenvironment = \"testnet\"\n");
        assert!(matches!(result, Err(ConfigError::NoStrategies)));
    }

    #[test]
    fn test_duplicate_strategy_rejected() {
        let toml = format!("{}\n{}", MINIMAL, MINIMAL);
        assert!(matches!(
            AppConfig::from_toml(&toml),
            Err(ConfigError::DuplicateStrategy(name)) if name == "bnb"
        ));
    }

    #[test]
    fn test_invalid_strategy_names_offender() {
        let toml = MINIMAL.replace("buy_trigger = 0.01", "buy_trigger = 0.01\nbuy_cooldown_secs = 0");
        match AppConfig::from_toml(&toml) {
            Err(ConfigError::Strategy { name, source }) => {
                assert_eq!(name, "bnb");
                assert!(source.to_string().contains("buy_cooldown_secs"));
            }
            other => panic!("Expected strategy error, got {:?}", other),
        }
    }

    #[test]
    fn test_attribution_wait_must_outlast_order_request() {
        let toml = MINIMAL.replace(
            "buy_trigger = 0.01",
            "buy_trigger = 0.01\nfill_attribution_timeout_secs = 10",
        );
        assert!(matches!(
            AppConfig::from_toml(&toml),
            Err(ConfigError::Invalid {
                field: "strategies.fill_attribution_timeout_secs",
                ..
            })
        ));
        assert!(AppConfig::from_toml(MINIMAL).is_ok());
    }

    #[test]
    fn test_lease_renewal_must_precede_expiry() {
        let toml = format!("[stream]\nlease_renewal_secs = 3600\n{}", MINIMAL);
        assert!(matches!(
            AppConfig::from_toml(&toml),
            Err(ConfigError::Invalid {
                field: "stream.lease_renewal_secs",
                ..
            })
        ));
    }
}
