//! Tab tasks run by the page session once a counter page has loaded.

use std::time::Duration;

use async_trait::async_trait;
use cwatch_core::{AppConfig, ValidationStatus};

use crate::error::ScraperError;
use crate::probe::DomProbe;
use crate::reader::DEFAULT_QUERY_TIMEOUT;
use crate::sampler::{
    sample_fast_then_stable, sample_stable, sample_until_positive, FastSampling, RetryPolicy,
    SamplingResult, StableSampling,
};
use crate::session::TabTask;
use crate::sites::SiteProfile;
use crate::verify::{verify_handle, VerifyTiming};

/// Sampling knobs shared by both workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingPlan {
    pub stable: StableSampling,
    pub fast: FastSampling,
    /// Rounds of stable sampling allowed while waiting for a positive follower count.
    pub follower_rounds: RetryPolicy,
    pub follower_retry_delay: Duration,
    /// Bound on one DOM query inside a read.
    pub query_timeout: Duration,
}

impl Default for SamplingPlan {
    fn default() -> Self {
        Self {
            stable: StableSampling::default(),
            fast: FastSampling::default(),
            follower_rounds: RetryPolicy::Unbounded,
            follower_retry_delay: Duration::from_millis(500),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl SamplingPlan {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            stable: StableSampling {
                sample_count: config.sample_count,
                interval: Duration::from_millis(config.sample_interval_ms),
                timeout: Duration::from_millis(config.sample_timeout_ms),
            },
            fast: FastSampling {
                attempts: RetryPolicy::Bounded {
                    max_attempts: config.fast_max_attempts,
                },
                delay: Duration::from_millis(config.fast_retry_delay_ms),
            },
            follower_rounds: RetryPolicy::from_limit(config.follower_max_rounds),
            follower_retry_delay: Duration::from_millis(config.follower_retry_delay_ms),
            query_timeout: Duration::from_millis(config.query_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub followers: SamplingResult,
    /// Only sampled once followers resolved.
    pub posts: Option<SamplingResult>,
}

impl CounterSnapshot {
    /// Positive follower count, if one was read.
    #[must_use]
    pub fn followers(&self) -> Option<i64> {
        self.followers.count().filter(|n| *n > 0)
    }

    /// Positive post count; zero or unreadable is reported as `None`.
    #[must_use]
    pub fn posts(&self) -> Option<i64> {
        self.posts
            .as_ref()
            .and_then(SamplingResult::count)
            .filter(|n| *n > 0)
    }
}

/// Reads followers and posts from a loaded counter page.
pub struct ScrapeCounters<'a> {
    profile: &'a SiteProfile,
    plan: &'a SamplingPlan,
}

impl<'a> ScrapeCounters<'a> {
    #[must_use]
    pub fn new(profile: &'a SiteProfile, plan: &'a SamplingPlan) -> Self {
        Self { profile, plan }
    }
}

#[async_trait]
impl<T: DomProbe> TabTask<T> for ScrapeCounters<'_> {
    type Output = CounterSnapshot;

    async fn run(&mut self, tab: &T) -> Result<CounterSnapshot, ScraperError> {
        self.profile.prepare(tab).await;

        let followers = sample_until_positive(
            &self.profile.followers,
            tab,
            &self.plan.stable,
            self.plan.follower_rounds,
            self.plan.follower_retry_delay,
        )
        .await;

        let posts = if followers.is_resolved() {
            Some(
                sample_fast_then_stable(
                    &self.profile.posts,
                    tab,
                    &self.plan.fast,
                    &self.plan.stable,
                )
                .await,
            )
        } else {
            None
        };

        Ok(CounterSnapshot { followers, posts })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleCheck {
    pub status: ValidationStatus,
    pub followers: Option<i64>,
    pub posts: Option<i64>,
}

/// Decides whether a handle exists and, if it does, reads its counters once.
pub struct CheckHandle<'a> {
    profile: &'a SiteProfile,
    handle: &'a str,
    plan: &'a SamplingPlan,
    timing: &'a VerifyTiming,
}

impl<'a> CheckHandle<'a> {
    #[must_use]
    pub fn new(
        profile: &'a SiteProfile,
        handle: &'a str,
        plan: &'a SamplingPlan,
        timing: &'a VerifyTiming,
    ) -> Self {
        Self {
            profile,
            handle,
            plan,
            timing,
        }
    }
}

#[async_trait]
impl<T: DomProbe> TabTask<T> for CheckHandle<'_> {
    type Output = HandleCheck;

    async fn run(&mut self, tab: &T) -> Result<HandleCheck, ScraperError> {
        self.profile.prepare(tab).await;

        let status = verify_handle(tab, self.profile.platform, self.handle, self.timing).await;
        if status != ValidationStatus::Valid {
            return Ok(HandleCheck {
                status,
                followers: None,
                posts: None,
            });
        }

        let followers = sample_stable(&self.profile.followers, tab, &self.plan.stable).await;
        let posts =
            sample_fast_then_stable(&self.profile.posts, tab, &self.plan.fast, &self.plan.stable)
                .await;

        Ok(HandleCheck {
            status,
            followers: followers.count(),
            posts: posts.count(),
        })
    }
}
