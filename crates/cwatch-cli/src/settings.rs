//! Per-workflow knobs derived from [`AppConfig`].

use std::time::Duration;

use anyhow::Context;
use chrono::FixedOffset;
use cwatch_core::{utc_offset, AppConfig};
use cwatch_scraper::{SamplingPlan, SessionPolicy, VerifyTiming};

#[derive(Debug, Clone)]
pub(crate) struct CycleSettings {
    pub period: Duration,
    pub inter_target_delay: Duration,
    pub plan: SamplingPlan,
    pub policy: SessionPolicy,
    pub verify: VerifyTiming,
    pub utc_offset: FixedOffset,
}

impl CycleSettings {
    pub(crate) fn monitor(config: &AppConfig) -> anyhow::Result<Self> {
        Self::build(
            config,
            Duration::from_secs(config.monitor_interval_secs),
            config.monitor_max_attempts,
        )
    }

    /// Profile pages are slower than counter pages, so validation navigates
    /// with at least `validate_nav_timeout_ms` on every attempt.
    pub(crate) fn validate(config: &AppConfig) -> anyhow::Result<Self> {
        let mut settings = Self::build(
            config,
            Duration::from_secs(config.validate_interval_secs),
            config.validate_max_attempts,
        )?;
        settings.policy = settings
            .policy
            .with_min_nav_timeout(Duration::from_millis(config.validate_nav_timeout_ms));
        Ok(settings)
    }

    fn build(config: &AppConfig, period: Duration, max_attempts: Option<u32>) -> anyhow::Result<Self> {
        let utc_offset = utc_offset(config.utc_offset_hours)
            .with_context(|| format!("invalid UTC offset {}", config.utc_offset_hours))?;
        Ok(Self {
            period,
            inter_target_delay: Duration::from_millis(config.inter_target_delay_ms),
            plan: SamplingPlan::from_app_config(config),
            policy: SessionPolicy::from_app_config(config, max_attempts),
            verify: VerifyTiming::default(),
            utc_offset,
        })
    }
}
