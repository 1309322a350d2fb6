//! Binance REST API error types.

use exchange_core::ExchangeError;
use thiserror::Error;

/// Errors that can occur when interacting with the Binance REST API.
#[derive(Debug, Error)]
pub enum BinanceRestError {
    /// Non-success HTTP status without a Binance error body.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    /// Connection error (network issue).
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Binance API error (returned by the exchange).
    #[error("Binance API error {code}: {message}")]
    Api { code: i32, message: String },

    #[error("Order not found")]
    OrderNotFound,

    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Listen key has expired or is invalid.
    #[error("Listen key expired or invalid")]
    ListenKeyExpired,

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing environment variable: {0}")]
    MissingCredentials(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl BinanceRestError {
    /// Classify an error response body.
    ///
    /// Binance returns errors in the format: `{"code": -1000, "msg": "..."}`
    pub fn from_api_response(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ApiError {
            code: i32,
            msg: String,
        }

        match serde_json::from_str::<ApiError>(body) {
            Ok(err) => Self::classify_api_error(err.code, err.msg),
            Err(_) if status == 429 || status == 418 => Self::RateLimited {
                retry_after_ms: 60_000,
            },
            Err(_) => Self::Http {
                status,
                message: body.to_string(),
            },
        }
    }

    fn classify_api_error(code: i32, message: String) -> Self {
        match code {
            // Listen key errors
            -1125 => Self::ListenKeyExpired,
            // Order errors
            -2010 => Self::InsufficientBalance,
            -2011 | -2013 => Self::OrderNotFound,
            _ => Self::Api { code, message },
        }
    }
}

impl From<reqwest::Error> for BinanceRestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Connection(err.to_string())
        }
    }
}

impl From<BinanceRestError> for ExchangeError {
    fn from(err: BinanceRestError) -> Self {
        match err {
            BinanceRestError::ListenKeyExpired => Self::SessionExpired,
            BinanceRestError::OrderNotFound => Self::OrderNotFound,
            BinanceRestError::InsufficientBalance => Self::InsufficientBalance,
            BinanceRestError::Api { code, message } => Self::Api { code, message },
            BinanceRestError::Parse(message) => Self::Decode(message),
            other => Self::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_known_codes() {
        assert!(matches!(
            BinanceRestError::from_api_response(400, r#"{"code":-1125,"msg":"This listenKey does not exist."}"#),
            BinanceRestError::ListenKeyExpired
        ));
        assert!(matches!(
            BinanceRestError::from_api_response(400, r#"{"code":-2010,"msg":"Account has insufficient balance"}"#),
            BinanceRestError::InsufficientBalance
        ));
        assert!(matches!(
            BinanceRestError::from_api_response(400, r#"{"code":-2013,"msg":"Order does not exist."}"#),
            BinanceRestError::OrderNotFound
        ));
        assert!(matches!(
            BinanceRestError::from_api_response(400, r#"{"code":-1013,"msg":"Filter failure: NOTIONAL"}"#),
            BinanceRestError::Api { code: -1013, .. }
        ));
    }

    #[test]
    fn test_non_json_bodies() {
        assert!(matches!(
            BinanceRestError::from_api_response(429, "Too many requests"),
            BinanceRestError::RateLimited { .. }
        ));
        assert!(matches!(
            BinanceRestError::from_api_response(502, "<html>bad gateway</html>"),
            BinanceRestError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn test_maps_into_exchange_error() {
        assert!(ExchangeError::from(BinanceRestError::ListenKeyExpired).is_session_expired());
        assert!(matches!(
            ExchangeError::from(BinanceRestError::Timeout),
            ExchangeError::Transport(_)
        ));
    }
}
