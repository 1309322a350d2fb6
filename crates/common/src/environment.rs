//! Binance endpoints per environment.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Which Binance deployment the bot talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum BinanceEnvironment {
    /// Live spot market.
    #[default]
    Production,
    /// Spot testnet (paper funds).
    Testnet,
}

impl BinanceEnvironment {
    /// REST API base URL.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://api.binance.com",
            Self::Testnet => "https://testnet.binance.vision",
        }
    }

    /// WebSocket base URL (without the `/ws` path).
    pub fn ws_base_url(&self) -> &'static str {
        match self {
            Self::Production => "wss://stream.binance.com:9443",
            Self::Testnet => "wss://testnet.binance.vision",
        }
    }

    /// Raw stream URL for the account event feed bound to `listen_key`.
    pub fn account_stream_url(&self, listen_key: &str) -> String {
        format!("{}/ws/{}", self.ws_base_url(), listen_key)
    }

    /// Raw stream URL for `symbol`'s candles at `interval` (e.g. `1m`).
    pub fn kline_stream_url(&self, symbol: &str, interval: &str) -> String {
        format!(
            "{}/ws/{}@kline_{}",
            self.ws_base_url(),
            symbol.to_lowercase(),
            interval
        )
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for BinanceEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" | "mainnet" => Ok(Self::Production),
            "testnet" | "test" => Ok(Self::Testnet),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

impl TryFrom<String> for BinanceEnvironment {
    type Error = ParseEnvironmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Unrecognised environment name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid environment '{0}', expected 'production' or 'testnet'")]
pub struct ParseEnvironmentError(String);
