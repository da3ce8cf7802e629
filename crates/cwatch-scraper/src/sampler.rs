//! Sampling policies that turn noisy odometer reads into one trustworthy value.
//!
//! Counter widgets roll their digits while loading, so a single read is not
//! enough. [`sample_stable`] keeps taking short bursts of reads until every
//! read in a burst agrees. [`sample_fast`] is the cheaper path used for post
//! counts: it takes the first well-formed read.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::reader::{Reading, ValueReader};

/// Burst sampling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StableSampling {
    pub sample_count: usize,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for StableSampling {
    fn default() -> Self {
        Self {
            sample_count: 3,
            interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

/// How many times an operation may run before giving up.
///
/// `Unbounded` is an explicit opt-in: it never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Unbounded,
    Bounded { max_attempts: u32 },
}

impl RetryPolicy {
    /// `None` maps to [`RetryPolicy::Unbounded`].
    #[must_use]
    pub fn from_limit(limit: Option<u32>) -> Self {
        match limit {
            Some(max_attempts) => RetryPolicy::Bounded { max_attempts },
            None => RetryPolicy::Unbounded,
        }
    }

    /// Whether attempt number `attempt` (1-based) may run.
    #[must_use]
    pub fn allows(self, attempt: u32) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Bounded { max_attempts } => attempt <= max_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastSampling {
    pub attempts: RetryPolicy,
    pub delay: Duration,
}

impl Default for FastSampling {
    fn default() -> Self {
        Self {
            attempts: RetryPolicy::Bounded { max_attempts: 10 },
            delay: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// A full burst agreed.
    Stable,
    /// The fast path took a single well-formed read.
    Accepted,
    /// The burst loop ran out of time.
    TimedOut,
    /// Every allowed attempt was used without a usable value.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingResult {
    pub reading: Reading,
    pub status: SampleStatus,
    /// Bursts for the stable sampler, reads for the fast sampler.
    pub rounds: u32,
}

impl SamplingResult {
    fn unavailable(status: SampleStatus, rounds: u32) -> Self {
        Self {
            reading: Reading::Unavailable,
            status,
            rounds,
        }
    }

    #[must_use]
    pub fn count(&self) -> Option<i64> {
        self.reading.count()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, SampleStatus::Stable | SampleStatus::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstVerdict {
    Accepted(String),
    /// Burst disagreed; `outliers` are the indices that differ from the majority.
    Unstable {
        majority: Reading,
        outliers: Vec<usize>,
    },
}

/// A burst is accepted iff it is non-empty, every read is equal, and none is
/// the sentinel.
#[must_use]
pub fn evaluate_burst(burst: &[Reading]) -> BurstVerdict {
    if let Some(Reading::Found(first)) = burst.first() {
        if burst.iter().all(|r| matches!(r, Reading::Found(v) if v == first)) {
            return BurstVerdict::Accepted(first.clone());
        }
    }

    let majority = majority_reading(burst);
    let outliers = burst
        .iter()
        .enumerate()
        .filter(|(_, r)| **r != majority)
        .map(|(i, _)| i)
        .collect();
    BurstVerdict::Unstable { majority, outliers }
}

/// Most frequent reading; ties go to the one seen first.
fn majority_reading(burst: &[Reading]) -> Reading {
    let mut counts: HashMap<&Reading, usize> = HashMap::new();
    for reading in burst {
        *counts.entry(reading).or_default() += 1;
    }
    let mut best: Option<(&Reading, usize)> = None;
    for reading in burst {
        let count = counts[&reading];
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((reading, count));
        }
    }
    best.map_or(Reading::Unavailable, |(r, _)| r.clone())
}

/// Samples in bursts until one burst fully agrees or `config.timeout` passes.
///
/// Returns the agreed value on the first agreeing burst, or the sentinel with
/// [`SampleStatus::TimedOut`].
pub async fn sample_stable<R, P>(reader: &R, page: &P, config: &StableSampling) -> SamplingResult
where
    R: ValueReader<P> + ?Sized,
    P: ?Sized + Sync,
{
    let start = Instant::now();
    let sample_count = config.sample_count.max(1);
    let mut bursts = 0u32;

    while start.elapsed() < config.timeout {
        let mut burst = Vec::with_capacity(sample_count);
        for i in 0..sample_count {
            burst.push(reader.read(page).await);
            if i + 1 < sample_count {
                tokio::time::sleep(config.interval).await;
            }
        }
        bursts += 1;

        match evaluate_burst(&burst) {
            BurstVerdict::Accepted(value) => {
                tracing::debug!(bursts, value = %value, "stable reading");
                return SamplingResult {
                    reading: Reading::Found(value),
                    status: SampleStatus::Stable,
                    rounds: bursts,
                };
            }
            BurstVerdict::Unstable { majority, outliers } => {
                tracing::debug!(
                    bursts,
                    majority = %majority,
                    ?outliers,
                    samples = ?burst.iter().map(Reading::as_str).collect::<Vec<_>>(),
                    "burst disagreed"
                );
            }
        }
    }

    tracing::debug!(bursts, timeout = ?config.timeout, "stable sampling timed out");
    SamplingResult::unavailable(SampleStatus::TimedOut, bursts)
}

/// Takes the first well-formed read, sleeping `config.delay` between attempts.
pub async fn sample_fast<R, P>(reader: &R, page: &P, config: &FastSampling) -> SamplingResult
where
    R: ValueReader<P> + ?Sized,
    P: ?Sized + Sync,
{
    let mut attempt = 1u32;
    loop {
        let reading = reader.read(page).await;
        if reading.is_found() {
            return SamplingResult {
                reading,
                status: SampleStatus::Accepted,
                rounds: attempt,
            };
        }
        if !config.attempts.allows(attempt + 1) {
            return SamplingResult::unavailable(SampleStatus::Exhausted, attempt);
        }
        tokio::time::sleep(config.delay).await;
        attempt += 1;
    }
}

/// Fast path first; the full burst sampler only when it comes back empty.
pub async fn sample_fast_then_stable<R, P>(
    reader: &R,
    page: &P,
    fast: &FastSampling,
    stable: &StableSampling,
) -> SamplingResult
where
    R: ValueReader<P> + ?Sized,
    P: ?Sized + Sync,
{
    let quick = sample_fast(reader, page, fast).await;
    if quick.is_resolved() {
        return quick;
    }
    sample_stable(reader, page, stable).await
}

/// Repeats stable sampling until the value is a positive count.
///
/// With [`RetryPolicy::Unbounded`] this never returns without a positive
/// value, so a zero or missing follower count is never reported.
pub async fn sample_until_positive<R, P>(
    reader: &R,
    page: &P,
    stable: &StableSampling,
    rounds: RetryPolicy,
    retry_delay: Duration,
) -> SamplingResult
where
    R: ValueReader<P> + ?Sized,
    P: ?Sized + Sync,
{
    let mut round = 1u32;
    loop {
        let result = sample_stable(reader, page, stable).await;
        if result.is_resolved() && result.count().is_some_and(|n| n > 0) {
            return SamplingResult {
                rounds: round,
                ..result
            };
        }
        if !rounds.allows(round + 1) {
            tracing::debug!(round, "no positive value before the round limit");
            return SamplingResult::unavailable(SampleStatus::Exhausted, round);
        }
        tracing::debug!(round, reading = %result.reading, "value not positive yet, retrying");
        tokio::time::sleep(retry_delay).await;
        round += 1;
    }
}

#[cfg(test)]
#[path = "sampler_test.rs"]
mod tests;
