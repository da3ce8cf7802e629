//! In-memory store and settings used by the workflow tests.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use cwatch_core::{CycleStats, CycleType, UserRecord, UserUpdate, ValidationStatus};
use cwatch_scraper::{
    FastSampling, RetryPolicy, SamplingPlan, SessionPolicy, StableSampling, VerifyTiming,
};
use uuid::Uuid;

use crate::settings::CycleSettings;
use crate::store::{StatsStore, UserStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedStats {
    pub stats: CycleStats,
    pub local_datetime: String,
    pub scrape_duration: String,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    users: Mutex<Vec<UserRecord>>,
    updates: Mutex<Vec<UserUpdate>>,
    stats: Mutex<Vec<RecordedStats>>,
    sessions_today: i64,
    unreachable: bool,
}

impl MemoryStore {
    pub(crate) fn with_users(users: Vec<UserRecord>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    pub(crate) fn sessions_today(mut self, count: i64) -> Self {
        self.sessions_today = count;
        self
    }

    /// Every read fails, as a dropped connection would.
    pub(crate) fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub(crate) fn set_users(&self, users: Vec<UserRecord>) {
        *lock(&self.users) = users;
    }

    pub(crate) fn updates(&self) -> Vec<UserUpdate> {
        lock(&self.updates).clone()
    }

    pub(crate) fn take_updates(&self) -> Vec<UserUpdate> {
        std::mem::take(&mut *lock(&self.updates))
    }

    pub(crate) fn recorded(&self) -> Vec<RecordedStats> {
        lock(&self.stats).clone()
    }

    fn read_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        if self.unreachable {
            anyhow::bail!("connection refused");
        }
        Ok(lock(&self.users).clone())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn monitor_users(&self) -> anyhow::Result<Vec<UserRecord>> {
        self.read_users()
    }

    async fn validation_candidates(&self) -> anyhow::Result<Vec<UserRecord>> {
        self.read_users()
    }

    /// Applies the update to the held user, so later reads see new statuses.
    async fn apply(&self, update: &UserUpdate) -> anyhow::Result<()> {
        let mut users = lock(&self.users);
        let user = users
            .iter_mut()
            .find(|u| u.id == update.user_id)
            .ok_or_else(|| anyhow::anyhow!("user {} not found", update.user_id))?;
        if let Some(status) = update.status {
            let stored = Some(status.as_str().to_owned());
            match update.platform {
                cwatch_core::Platform::Instagram => user.instagram_status = stored,
                cwatch_core::Platform::Tiktok => user.tiktok_status = stored,
            }
        }
        lock(&self.updates).push(update.clone());
        Ok(())
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn sessions_between(
        &self,
        cycle_type: CycleType,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        if self.unreachable {
            anyhow::bail!("connection refused");
        }
        let recorded = lock(&self.stats)
            .iter()
            .filter(|r| r.stats.cycle_type == cycle_type)
            .count();
        Ok(self.sessions_today + i64::try_from(recorded)?)
    }

    async fn record(
        &self,
        stats: &CycleStats,
        local_datetime: &str,
        scrape_duration: &str,
    ) -> anyhow::Result<()> {
        lock(&self.stats).push(RecordedStats {
            stats: stats.clone(),
            local_datetime: local_datetime.to_owned(),
            scrape_duration: scrape_duration.to_owned(),
        });
        Ok(())
    }
}

pub(crate) fn user(
    instagram: Option<&str>,
    tiktok: Option<&str>,
    status: Option<ValidationStatus>,
) -> UserRecord {
    let stored = status.map(|s| s.as_str().to_owned());
    UserRecord {
        id: Uuid::new_v4(),
        instagram_handle: instagram.map(str::to_owned),
        tiktok_handle: tiktok.map(str::to_owned),
        instagram_status: instagram.and(stored.clone()),
        tiktok_status: tiktok.and(stored),
    }
}

/// Short, bounded settings so a missing counter cannot stall a test.
pub(crate) fn settings(max_attempts: Option<u32>) -> CycleSettings {
    CycleSettings {
        period: Duration::from_secs(30),
        inter_target_delay: Duration::from_secs(1),
        plan: SamplingPlan {
            stable: StableSampling::default(),
            fast: FastSampling {
                attempts: RetryPolicy::Bounded { max_attempts: 2 },
                delay: Duration::from_millis(300),
            },
            follower_rounds: RetryPolicy::Bounded { max_attempts: 2 },
            follower_retry_delay: Duration::from_millis(500),
            query_timeout: Duration::from_secs(1),
        },
        policy: SessionPolicy {
            max_attempts,
            ..SessionPolicy::default()
        },
        verify: VerifyTiming::default(),
        utc_offset: FixedOffset::east_opt(7 * 3600).unwrap(),
    }
}
