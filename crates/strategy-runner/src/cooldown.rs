use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

/// Gate that admits one action per cooldown period.
///
/// [`try_arm`](CooldownGate::try_arm) closes the gate and starts a timer that
/// reopens it after `duration`, whatever became of the action.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    armed: Arc<AtomicBool>,
    duration: Duration,
}

impl CooldownGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(false)),
            duration,
        }
    }

    /// Close the gate. Returns `false` if it was already closed.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn try_arm(&self) -> bool {
        if self
            .armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let armed = self.armed.clone();
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            armed.store(false, Ordering::Release);
            trace!("Cooldown released");
        });
        true
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        !self.armed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gate_admits_once_per_period() {
        let gate = CooldownGate::new(Duration::from_secs(60));

        assert!(gate.try_arm());
        assert!(!gate.try_arm());
        assert!(!gate.is_idle());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(!gate.try_arm());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(gate.is_idle());
        assert!(gate.try_arm());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_state() {
        let gate = CooldownGate::new(Duration::from_secs(5));
        let other = gate.clone();

        assert!(gate.try_arm());
        assert!(!other.try_arm());
    }
}
