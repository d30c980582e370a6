use std::time::Duration;

pub const DEFAULT_MAX_IDLE: usize = 3;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Tunables for a [`Pool`](super::Pool).
///
/// `idle_timeout` decides when a reused connection is trusted without a round
/// trip: anything idle for less is handed out directly, anything idle for at
/// least that long is validated first. `Duration::ZERO` validates every reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    max_idle: usize,
    idle_timeout: Duration,
    max_idle_lifetime: Option<Duration>,
}

impl PoolOptions {
    pub fn new() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_idle_lifetime: None,
        }
    }

    /// Cap on connections kept idle. Zero disables reuse entirely.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Idle connections older than `lifetime` are closed without validation,
    /// both on borrow and by [`Pool::reap_idle`](super::Pool::reap_idle).
    pub fn with_max_idle_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_idle_lifetime = Some(lifetime);
        self
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_idle_lifetime(&self) -> Option<Duration> {
        self.max_idle_lifetime
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::new()
    }
}
