//! Account stream supervision.
//!
//! Keeps the balance ledger fed from the exchange's account event stream:
//! obtains and renews the session lease, decodes balance position events into
//! ledger updates, and on any stream loss re-snapshots balances before
//! reconnecting.

mod lease;
mod supervisor;

pub use supervisor::AccountStreamSupervisor;

use common::BackoffPolicy;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Connection lifecycle of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Authenticating,
    Streaming,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Stream supervision settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Interval between lease renewals. Binance listen keys live 60 minutes.
    pub lease_renewal_secs: u64,
    /// Reconnect pacing.
    pub backoff: BackoffPolicy,
    /// A connection that stayed up this long resets the backoff.
    pub stable_after_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            lease_renewal_secs: 30 * 60,
            backoff: BackoffPolicy::default(),
            stable_after_secs: 300,
        }
    }
}

impl StreamConfig {
    pub fn lease_renewal(&self) -> Duration {
        Duration::from_secs(self.lease_renewal_secs.max(1))
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_after_secs)
    }
}
