//! Secure API credential management.
//!
//! Uses the `secrecy` crate to prevent accidental logging of secret keys
//! and ensures memory is zeroed on drop.

use crate::error::BinanceRestError;
use secrecy::{ExposeSecret, SecretString};

const API_KEY_VAR: &str = "BINANCE_API_KEY";
const SECRET_KEY_VAR: &str = "BINANCE_SECRET_KEY";

/// API credentials for authenticated requests.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

impl ApiCredentials {
    /// Load credentials from `BINANCE_API_KEY` / `BINANCE_SECRET_KEY`.
    ///
    /// A `.env` file in the working directory is honoured if present.
    pub fn from_env() -> Result<Self, BinanceRestError> {
        // Load .env file if present (ignores errors if file doesn't exist)
        dotenvy::dotenv().ok();

        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| BinanceRestError::MissingCredentials(API_KEY_VAR.into()))?;
        let secret_key = std::env::var(SECRET_KEY_VAR)
            .map_err(|_| BinanceRestError::MissingCredentials(SECRET_KEY_VAR.into()))?;

        Ok(Self::new(api_key, secret_key))
    }

    /// Prefer explicitly configured values, fall back to the environment.
    pub fn resolve(
        api_key: Option<String>,
        secret_key: Option<String>,
    ) -> Result<Self, BinanceRestError> {
        match (api_key, secret_key) {
            (Some(api_key), Some(secret_key)) if !api_key.is_empty() && !secret_key.is_empty() => {
                Ok(Self::new(api_key, secret_key))
            }
            _ => Self::from_env(),
        }
    }

    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: SecretString::from(secret_key),
        }
    }

    /// Get the API key (public, safe to log).
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Expose the secret key for signing.
    ///
    /// **WARNING**: Only use this for cryptographic operations.
    pub(crate) fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let creds = ApiCredentials::new("my_api_key".into(), "super_secret_key".into());
        let debug_str = format!("{:?}", creds);

        assert!(debug_str.contains("my_api_key"));
        assert!(!debug_str.contains("super_secret_key"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_resolve_prefers_explicit_values() {
        let creds = ApiCredentials::resolve(Some("cfg_key".into()), Some("cfg_secret".into())).unwrap();
        assert_eq!(creds.api_key(), "cfg_key");
        assert_eq!(creds.expose_secret(), "cfg_secret");
    }
}
