//! Session manager configuration

use std::time::Duration;

/// Shortest reaper period accepted
pub const MIN_REAP_INTERVAL: Duration = Duration::from_millis(10);

/// Session lifecycle options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Tear down connections with no client activity for this long
    pub idle_timeout: Duration,

    /// How often the reaper checks for stale connections
    pub reap_interval: Duration,

    /// Let one connection hold update registrations in several series.
    /// When false, subscribing to a new series replaces the current one.
    pub allow_multi_series: bool,

    /// Drop empty per-series stores during each reaper pass
    pub evict_empty_series: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(90),
            reap_interval: Duration::from_secs(15),
            allow_multi_series: false,
            evict_empty_series: true,
        }
    }
}

impl SessionConfig {
    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set reaper interval (at least [`MIN_REAP_INTERVAL`])
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval.max(MIN_REAP_INTERVAL);
        self
    }

    /// Allow registrations in more than one series per connection
    pub fn allow_multi_series(mut self, allow: bool) -> Self {
        self.allow_multi_series = allow;
        self
    }

    /// Keep empty per-series stores around
    pub fn keep_empty_series(mut self) -> Self {
        self.evict_empty_series = false;
        self
    }
}
