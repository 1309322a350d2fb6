//! Human-readable status pushes (executions, cost-basis changes).
//!
//! Delivery is best-effort: failures are logged and never reach the caller.

mod bark;

pub use bark::{BarkConfig, BarkError, BarkNotifier};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

/// Sink for status messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, message: &str);
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Writes messages to the log only. Used when no push service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn push(&self, message: &str) {
        info!(message = %message, "notification");
    }
}

/// Build the configured notifier, falling back to [`LogNotifier`].
pub fn build_notifier(bark: Option<&BarkConfig>) -> Result<SharedNotifier, BarkError> {
    match bark {
        Some(cfg) => Ok(Arc::new(BarkNotifier::new(cfg)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
