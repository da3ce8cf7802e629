//! Retry schedule for page visits.
//!
//! | Failures so far | Navigation timeout | Delay before next attempt |
//! |-----------------|--------------------|---------------------------|
//! | 0 | 3 s | - |
//! | 1 | 5 s | 2 s |
//! | 2 | 8 s | 4 s |
//! | 3 | 12 s | 8 s (context restart on timeout) |
//! | 4 | 15 s | 16 s |
//! | 5+ | 15 s | `min(2^n, max)` (context restart every 5th) |

use std::time::Duration;

use cwatch_core::AppConfig;

use crate::error::ScraperError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Per-attempt navigation timeouts; the last entry repeats.
    pub nav_timeouts: Vec<Duration>,
    pub network_idle_timeout: Duration,
    pub max_backoff: Duration,
    /// Restart the context after every n-th failure when that failure was a
    /// navigation timeout. `0` disables.
    pub timeout_restart_interval: u32,
    /// Restart the context after every n-th failure of any kind. `0` disables.
    pub recovery_restart_interval: u32,
    /// `None` retries a target until it succeeds.
    pub max_attempts: Option<u32>,
    pub url_settle_polls: u32,
    pub url_settle_interval: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            nav_timeouts: [3000, 5000, 8000, 12000, 15000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            network_idle_timeout: Duration::from_secs(3),
            max_backoff: Duration::from_secs(300),
            timeout_restart_interval: 3,
            recovery_restart_interval: 5,
            max_attempts: None,
            url_settle_polls: 15,
            url_settle_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    RepeatedTimeouts,
    PeriodicRecovery,
}

impl SessionPolicy {
    /// Session settings from config with the workflow's own attempt limit.
    #[must_use]
    pub fn from_app_config(config: &AppConfig, max_attempts: Option<u32>) -> Self {
        let defaults = Self::default();
        let nav_timeouts = if config.nav_timeouts_ms.is_empty() {
            defaults.nav_timeouts
        } else {
            config.nav_timeouts_ms.iter().copied().map(Duration::from_millis).collect()
        };
        Self {
            nav_timeouts,
            network_idle_timeout: Duration::from_millis(config.network_idle_timeout_ms),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            timeout_restart_interval: config.timeout_restart_interval,
            recovery_restart_interval: config.recovery_restart_interval,
            max_attempts,
            ..defaults
        }
    }

    /// Raises every step of the navigation ladder to at least `floor`.
    #[must_use]
    pub fn with_min_nav_timeout(mut self, floor: Duration) -> Self {
        if self.nav_timeouts.is_empty() {
            self.nav_timeouts.push(floor);
        }
        for timeout in &mut self.nav_timeouts {
            *timeout = (*timeout).max(floor);
        }
        self
    }

    /// Navigation timeout for the attempt that follows `failures` failures.
    #[must_use]
    pub fn nav_timeout(&self, failures: u32) -> Duration {
        let index = usize::try_from(failures).unwrap_or(usize::MAX);
        self.nav_timeouts
            .get(index)
            .or_else(|| self.nav_timeouts.last())
            .copied()
            .unwrap_or(Duration::from_secs(15))
    }

    /// `min(2^failures seconds, max_backoff)`.
    #[must_use]
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let secs = 1u64 << failures.min(62);
        Duration::from_secs(secs).min(self.max_backoff)
    }

    /// Whether the browser context should be recreated after this failure.
    ///
    /// At most one restart per failure even when both cadences line up.
    #[must_use]
    pub fn restart_reason(&self, failures: u32, err: &ScraperError) -> Option<RestartReason> {
        let hits = |interval: u32| interval > 0 && failures > 0 && failures % interval == 0;
        if err.is_navigation_timeout() && hits(self.timeout_restart_interval) {
            Some(RestartReason::RepeatedTimeouts)
        } else if hits(self.recovery_restart_interval) {
            Some(RestartReason::PeriodicRecovery)
        } else {
            None
        }
    }
}
