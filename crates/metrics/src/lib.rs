use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters for the balance ledger, the account stream and order flow.
#[derive(Debug)]
pub struct EngineMetrics {
    // Ledger
    balance_updates_applied: AtomicU64,
    stale_updates_dropped: AtomicU64,
    notifications_dropped: AtomicU64,

    // Streams
    account_messages: AtomicU64,
    candles_received: AtomicU64,
    parse_errors: AtomicU64,
    stream_errors: AtomicU64,
    reconnect_attempts: AtomicU64,
    resyncs: AtomicU64,

    // Orders
    orders_submitted: AtomicU64,
    order_failures: AtomicU64,
    watchdog_cancels: AtomicU64,
    watchdog_errors: AtomicU64,

    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_account_message: Option<Instant>,
    last_candle: Option<Instant>,
    last_error: Option<Instant>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            balance_updates_applied: AtomicU64::new(0),
            stale_updates_dropped: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            account_messages: AtomicU64::new(0),
            candles_received: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            orders_submitted: AtomicU64::new(0),
            order_failures: AtomicU64::new(0),
            watchdog_cancels: AtomicU64::new(0),
            watchdog_errors: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_account_message: None,
                last_candle: None,
                last_error: None,
            }),
        }
    }

    // --- Increment methods ---

    pub fn inc_balance_updates_applied(&self) {
        self.balance_updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stale_updates_dropped(&self) {
        self.stale_updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notifications_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_account_messages(&self) {
        self.account_messages.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_account_message = Some(Instant::now());
    }

    pub fn inc_candles_received(&self) {
        self.candles_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_candle = Some(Instant::now());
    }

    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error = Some(Instant::now());
    }

    pub fn inc_stream_errors(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error = Some(Instant::now());
    }

    pub fn inc_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resyncs(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_submitted(&self) {
        self.orders_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_order_failures(&self) {
        self.order_failures.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error = Some(Instant::now());
    }

    pub fn inc_watchdog_cancels(&self) {
        self.watchdog_cancels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_watchdog_errors(&self) {
        self.watchdog_errors.fetch_add(1, Ordering::Relaxed);
    }

    // --- Getter methods ---

    pub fn balance_updates_applied(&self) -> u64 {
        self.balance_updates_applied.load(Ordering::Relaxed)
    }

    pub fn stale_updates_dropped(&self) -> u64 {
        self.stale_updates_dropped.load(Ordering::Relaxed)
    }

    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    pub fn account_messages(&self) -> u64 {
        self.account_messages.load(Ordering::Relaxed)
    }

    pub fn candles_received(&self) -> u64 {
        self.candles_received.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn stream_errors(&self) -> u64 {
        self.stream_errors.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    pub fn orders_submitted(&self) -> u64 {
        self.orders_submitted.load(Ordering::Relaxed)
    }

    pub fn order_failures(&self) -> u64 {
        self.order_failures.load(Ordering::Relaxed)
    }

    pub fn watchdog_cancels(&self) -> u64 {
        self.watchdog_cancels.load(Ordering::Relaxed)
    }

    pub fn watchdog_errors(&self) -> u64 {
        self.watchdog_errors.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_candle(&self) -> Option<f64> {
        self.inner
            .read()
            .last_candle
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_account_message(&self) -> Option<f64> {
        self.inner
            .read()
            .last_account_message
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            balance_updates_applied: self.balance_updates_applied(),
            stale_updates_dropped: self.stale_updates_dropped(),
            notifications_dropped: self.notifications_dropped(),
            account_messages: self.account_messages(),
            candles_received: self.candles_received(),
            parse_errors: self.parse_errors(),
            stream_errors: self.stream_errors(),
            reconnect_attempts: self.reconnect_attempts(),
            resyncs: self.resyncs(),
            orders_submitted: self.orders_submitted(),
            order_failures: self.order_failures(),
            watchdog_cancels: self.watchdog_cancels(),
            watchdog_errors: self.watchdog_errors(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_candle: self.secs_since_last_candle(),
            secs_since_last_account_message: self.secs_since_last_account_message(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub balance_updates_applied: u64,
    pub stale_updates_dropped: u64,
    pub notifications_dropped: u64,
    pub account_messages: u64,
    pub candles_received: u64,
    pub parse_errors: u64,
    pub stream_errors: u64,
    pub reconnect_attempts: u64,
    pub resyncs: u64,
    pub orders_submitted: u64,
    pub order_failures: u64,
    pub watchdog_cancels: u64,
    pub watchdog_errors: u64,
    pub uptime_secs: f64,
    pub secs_since_last_candle: Option<f64>,
    pub secs_since_last_account_message: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health of the market data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Candles are flowing.
    Healthy,
    /// Candles are late.
    Degraded,
    /// No candles for an extended period.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// Binance pushes kline updates roughly every 2s, so silence this long is suspicious.
    const STALE_THRESHOLD_SECS: f64 = 30.0;
    const UNHEALTHY_THRESHOLD_SECS: f64 = 120.0;

    /// Classify health from candle freshness.
    pub fn health_status(&self) -> HealthStatus {
        let silence = self.secs_since_last_candle.unwrap_or(self.uptime_secs);

        if silence > Self::UNHEALTHY_THRESHOLD_SECS {
            HealthStatus::Unhealthy
        } else if silence > Self::STALE_THRESHOLD_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Engine Metrics ===")?;
        writeln!(f, "Uptime:               {:.1}s", self.uptime_secs)?;
        writeln!(f, "Balance updates:      {}", self.balance_updates_applied)?;
        writeln!(f, "Stale updates:        {}", self.stale_updates_dropped)?;
        writeln!(f, "Dropped notices:      {}", self.notifications_dropped)?;
        writeln!(f, "Account messages:     {}", self.account_messages)?;
        writeln!(f, "Candles received:     {}", self.candles_received)?;
        writeln!(f, "Parse errors:         {}", self.parse_errors)?;
        writeln!(f, "Stream errors:        {}", self.stream_errors)?;
        writeln!(f, "Reconnect attempts:   {}", self.reconnect_attempts)?;
        writeln!(f, "Balance resyncs:      {}", self.resyncs)?;
        writeln!(f, "Orders submitted:     {}", self.orders_submitted)?;
        writeln!(f, "Order failures:       {}", self.order_failures)?;
        writeln!(f, "Watchdog cancels:     {}", self.watchdog_cancels)?;
        writeln!(f, "Watchdog errors:      {}", self.watchdog_errors)?;
        if let Some(secs) = self.secs_since_last_candle {
            writeln!(f, "Since last candle:    {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_account_message {
            writeln!(f, "Since account event:  {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:     {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<EngineMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(EngineMetrics::new())
}
