use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::Notifier;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Bark push service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BarkConfig {
    /// Server address, e.g. `api.day.app` or `https://bark.example.com`.
    pub url: String,
    /// Device key.
    pub token: String,
}

#[derive(Debug, Error)]
pub enum BarkError {
    #[error("invalid bark url '{0}'")]
    InvalidUrl(String),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Pushes messages to a Bark server with `GET {url}/{token}/{message}`.
#[derive(Debug, Clone)]
pub struct BarkNotifier {
    client: Client,
    base: Url,
    token: String,
}

impl BarkNotifier {
    pub fn new(config: &BarkConfig) -> Result<Self, BarkError> {
        let raw = if config.url.contains("://") {
            config.url.clone()
        } else {
            format!("http://{}", config.url)
        };
        let base = Url::parse(&raw).map_err(|_| BarkError::InvalidUrl(config.url.clone()))?;
        if base.cannot_be_a_base() {
            return Err(BarkError::InvalidUrl(config.url.clone()));
        }

        let client = Client::builder().timeout(PUSH_TIMEOUT).build()?;
        Ok(Self {
            client,
            base,
            token: config.token.clone(),
        })
    }

    /// Target URL for `message`, with the token and message percent-encoded as path segments.
    fn push_url(&self, message: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.token).push(message);
        }
        url
    }
}

#[async_trait]
impl Notifier for BarkNotifier {
    async fn push(&self, message: &str) {
        let url = self.push_url(message);
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => debug!("bark push delivered"),
            Ok(resp) => warn!(status = %resp.status(), "bark push rejected"),
            Err(e) => warn!(error = %e, "bark push failed"),
        }
    }
}
