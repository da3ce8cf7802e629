//! Page session manager: one browser context per cycle, one tab per visit.
//!
//! A visit opens a tab, navigates with the attempt's timeout, waits briefly
//! for the network to settle and the URL to land, then hands the tab to a
//! [`TabTask`]. Any failure closes the tab, backs off, and may recreate the
//! whole context before the next attempt.

use std::time::Duration;

use async_trait::async_trait;

use crate::backoff::{RestartReason, SessionPolicy};
use crate::error::ScraperError;
use crate::probe::DomProbe;

/// Browser automation backend.
///
/// Tabs never outlive the context they were opened in: the session closes
/// every tab before the context can be restarted.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    type Tab: DomProbe;

    async fn open_context(&mut self) -> Result<(), ScraperError>;

    async fn close_context(&mut self) -> Result<(), ScraperError>;

    /// Drops the current context (cookies, storage, cache) and opens a fresh one.
    async fn restart_context(&mut self) -> Result<(), ScraperError> {
        if let Err(e) = self.close_context().await {
            tracing::debug!(error = %e, "error closing context before restart");
        }
        self.open_context().await
    }

    async fn open_tab(&mut self) -> Result<Self::Tab, ScraperError>;

    /// Starts navigation and resolves once the document has loaded. Callers
    /// apply their own timeout.
    async fn navigate(&self, tab: &Self::Tab, url: &str) -> Result<(), ScraperError>;

    /// Best-effort wait for network activity to quiet down.
    async fn wait_network_idle(&self, tab: &Self::Tab) -> Result<(), ScraperError>;

    async fn close_tab(&mut self, tab: Self::Tab) -> Result<(), ScraperError>;

    /// Closes tabs that were opened but never closed. Returns how many.
    async fn reclaim(&mut self) -> Result<usize, ScraperError>;

    /// Closes everything, including the browser process.
    async fn shutdown(&mut self) -> Result<(), ScraperError>;
}

/// Work done on a loaded tab.
#[async_trait]
pub trait TabTask<T: DomProbe>: Send {
    type Output: Send;

    async fn run(&mut self, tab: &T) -> Result<Self::Output, ScraperError>;
}

/// Successful visit plus what it took to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit<O> {
    pub output: O,
    pub attempts: u32,
    pub context_restarts: u32,
    pub backoff_delays: Vec<Duration>,
}

pub struct PageSession<D: BrowserDriver> {
    driver: D,
    policy: SessionPolicy,
    context_open: bool,
}

impl<D: BrowserDriver> PageSession<D> {
    pub fn new(driver: D, policy: SessionPolicy) -> Self {
        Self {
            driver,
            policy,
            context_open: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Replaces the retry policy; workflows differ in how long they persist.
    pub fn set_policy(&mut self, policy: SessionPolicy) {
        self.policy = policy;
    }

    /// Opens the context shared by every visit of a cycle.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the context cannot be created.
    pub async fn begin_cycle(&mut self) -> Result<(), ScraperError> {
        if self.context_open {
            self.driver.close_context().await.ok();
        }
        self.driver.open_context().await?;
        self.context_open = true;
        Ok(())
    }

    /// Closes the cycle's context and reclaims stray tabs.
    ///
    /// # Errors
    ///
    /// Returns the driver error when reclamation fails. Context close errors
    /// are logged only.
    pub async fn end_cycle(&mut self) -> Result<usize, ScraperError> {
        if self.context_open {
            if let Err(e) = self.driver.close_context().await {
                tracing::warn!(error = %e, "failed to close browser context");
            }
            self.context_open = false;
        }
        let reclaimed = self.driver.reclaim().await?;
        if reclaimed > 0 {
            tracing::info!(reclaimed, "closed stray tabs");
        }
        Ok(reclaimed)
    }

    /// Releases every browser resource. Safe to call at any point.
    ///
    /// # Errors
    ///
    /// Returns the driver error from the final shutdown.
    pub async fn shutdown(&mut self) -> Result<(), ScraperError> {
        self.context_open = false;
        self.driver.shutdown().await
    }

    /// Loads `url` and runs `task` on it, retrying failures per the policy.
    ///
    /// `settle_marker`, when given, is a substring the tab URL is briefly
    /// polled for after load.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::AttemptsExhausted`] once a bounded policy runs
    /// out. An unbounded policy only returns on success.
    pub async fn visit<T>(
        &mut self,
        url: &str,
        settle_marker: Option<&str>,
        task: &mut T,
    ) -> Result<Visit<T::Output>, ScraperError>
    where
        T: TabTask<D::Tab>,
    {
        let mut failures = 0u32;
        let mut context_restarts = 0u32;
        let mut backoff_delays = Vec::new();

        loop {
            let err = match self.attempt(url, settle_marker, task, failures).await {
                Ok(output) => {
                    return Ok(Visit {
                        output,
                        attempts: failures + 1,
                        context_restarts,
                        backoff_delays,
                    });
                }
                Err(err) => err,
            };

            failures += 1;
            let timed_out = err.is_navigation_timeout();
            if timed_out {
                tracing::warn!(url, failures, error = %err, "navigation timed out");
            } else {
                tracing::warn!(url, failures, error = ?err, "page visit failed");
            }

            if self.policy.max_attempts.is_some_and(|max| failures >= max) {
                return Err(ScraperError::AttemptsExhausted {
                    url: url.to_owned(),
                    attempts: failures,
                    last_error: err.to_string(),
                });
            }

            let delay = self.policy.backoff_delay(failures);
            if let Some(reason) = self.policy.restart_reason(failures, &err) {
                match reason {
                    RestartReason::RepeatedTimeouts => {
                        tracing::info!(url, failures, "restarting browser context after repeated timeouts");
                    }
                    RestartReason::PeriodicRecovery => {
                        tracing::info!(url, failures, "restarting browser context for recovery");
                    }
                }
                match self.driver.restart_context().await {
                    Ok(()) => {
                        context_restarts += 1;
                        self.context_open = true;
                    }
                    Err(e) => tracing::warn!(error = %e, "browser context restart failed"),
                }
            }

            tracing::debug!(url, delay_secs = delay.as_secs(), "backing off before retry");
            backoff_delays.push(delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt<T>(
        &mut self,
        url: &str,
        settle_marker: Option<&str>,
        task: &mut T,
        failures: u32,
    ) -> Result<T::Output, ScraperError>
    where
        T: TabTask<D::Tab>,
    {
        let tab = self.driver.open_tab().await?;
        let result = self.drive(&tab, url, settle_marker, task, failures).await;
        if let Err(e) = self.driver.close_tab(tab).await {
            tracing::debug!(url, error = %e, "ignoring tab close error");
        }
        result
    }

    async fn drive<T>(
        &self,
        tab: &D::Tab,
        url: &str,
        settle_marker: Option<&str>,
        task: &mut T,
        failures: u32,
    ) -> Result<T::Output, ScraperError>
    where
        T: TabTask<D::Tab>,
    {
        let nav_timeout = self.policy.nav_timeout(failures);
        match tokio::time::timeout(nav_timeout, self.driver.navigate(tab, url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ScraperError::NavigationTimeout {
                    url: url.to_owned(),
                    timeout_ms: u64::try_from(nav_timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        match tokio::time::timeout(
            self.policy.network_idle_timeout,
            self.driver.wait_network_idle(tab),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(url, error = %e, "network idle wait failed"),
            Err(_) => tracing::debug!(url, "network idle wait timed out"),
        }

        self.settle_url(tab, url, settle_marker).await;
        task.run(tab).await
    }

    async fn settle_url(&self, tab: &D::Tab, url: &str, marker: Option<&str>) {
        for _ in 0..self.policy.url_settle_polls {
            if let Ok(Some(current)) = tab.current_url().await {
                if current == url || marker.is_some_and(|m| current.contains(m)) {
                    return;
                }
            }
            tokio::time::sleep(self.policy.url_settle_interval).await;
        }
        tracing::debug!(url, "tab url did not settle, continuing");
    }
}
