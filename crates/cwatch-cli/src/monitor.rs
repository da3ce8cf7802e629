//! Monitoring workflow: scrape every declared handle once per cycle.

use std::future::Future;

use chrono::Utc;
use cwatch_core::{
    format_duration_hms, format_local_stamp, local_day_bounds, monitor_targets, CycleStats,
    CycleType, Target, TargetResult, UserUpdate,
};
use cwatch_scraper::{BrowserDriver, PageSession, ScrapeCounters, SiteProfile};
use tokio::time::Instant;

use crate::schedule::{inter_target_delay, Ticker};
use crate::settings::CycleSettings;
use crate::store::{StatsStore, UserStore};

/// Runs monitoring cycles until `shutdown` resolves (or once), then releases
/// the browser.
pub(crate) async fn run<D, S>(
    session: &mut PageSession<D>,
    store: &S,
    settings: &CycleSettings,
    once: bool,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    D: BrowserDriver,
    S: UserStore + StatsStore,
{
    tokio::pin!(shutdown);
    let mut ticker = Ticker::new(settings.period);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            () = ticker.wait() => {}
        }

        let outcome = tokio::select! {
            () = &mut shutdown => None,
            result = run_cycle(session, store, settings) => Some(result),
        };
        match outcome {
            None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(error = %format!("{e:#}"), "monitoring cycle aborted");
                if let Err(e) = session.end_cycle().await {
                    tracing::warn!(error = %e, "cleanup after aborted cycle failed");
                }
            }
        }

        if once {
            break;
        }
        ticker.cycle_finished();
    }

    session.shutdown().await?;
    Ok(())
}

/// One full pass over every monitored handle.
///
/// Per-target failures are counted, never propagated. Only store reads and
/// the browser context itself can abort the cycle. A failed reclaim at the
/// end is reported after the cycle's stats have been recorded.
pub(crate) async fn run_cycle<D, S>(
    session: &mut PageSession<D>,
    store: &S,
    settings: &CycleSettings,
) -> anyhow::Result<CycleStats>
where
    D: BrowserDriver,
    S: UserStore + StatsStore,
{
    let started = Instant::now();
    let timestamp = Utc::now();

    let (day_start, day_end) = local_day_bounds(timestamp, settings.utc_offset);
    let done_today = store
        .sessions_between(CycleType::Monitor, day_start, day_end)
        .await?;
    let session_number = i32::try_from(done_today).unwrap_or(i32::MAX - 1) + 1;
    if session_number == 1 {
        tracing::info!("first monitoring session of the day");
    } else {
        tracing::info!(session_number, "monitoring session #{session_number} today");
    }

    let users = store.monitor_users().await?;
    let targets = monitor_targets(&users);
    tracing::info!(users = users.len(), targets = targets.len(), "monitoring cycle started");

    session.begin_cycle().await?;
    let mut results = Vec::with_capacity(targets.len());
    for (i, target) in targets.iter().enumerate() {
        let delay = inter_target_delay(i + 1, settings.inter_target_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        results.push(scrape_target(session, store, settings, target).await);
    }
    // The stats row is written even when the context cannot be reclaimed.
    let reclaimed = session.end_cycle().await;

    let success_count = u32::try_from(results.iter().filter(|r| r.succeeded).count()).unwrap_or(u32::MAX);
    let fail_count = u32::try_from(results.len()).unwrap_or(u32::MAX) - success_count;
    let duration_seconds = started.elapsed().as_secs_f64();
    let stats = CycleStats {
        timestamp,
        cycle_type: CycleType::Monitor,
        session_number,
        success_count,
        fail_count,
        duration_seconds,
        per_target_results: results,
    };

    let local_stamp = format_local_stamp(timestamp, settings.utc_offset);
    let scrape_duration = format_duration_hms(duration_seconds);
    store.record(&stats, &local_stamp, &scrape_duration).await?;

    tracing::info!(
        session_number,
        success = stats.success_count,
        failed = stats.fail_count,
        duration = %scrape_duration,
        at = %local_stamp,
        "monitoring cycle complete"
    );
    reclaimed?;
    Ok(stats)
}

async fn scrape_target<D, S>(
    session: &mut PageSession<D>,
    store: &S,
    settings: &CycleSettings,
    target: &Target,
) -> TargetResult
where
    D: BrowserDriver,
    S: UserStore,
{
    let mut result = TargetResult {
        user_id: target.user_id,
        handle: target.handle.clone(),
        platform: target.platform,
        followers: None,
        posts: None,
        succeeded: false,
    };

    let profile = SiteProfile::for_platform(target.platform).with_query_timeout(settings.plan.query_timeout);
    let url = profile.url(&target.handle);
    let mut task = ScrapeCounters::new(&profile, &settings.plan);

    let visit = match session.visit(&url, Some(profile.settle_marker()), &mut task).await {
        Ok(visit) => visit,
        Err(e) => {
            tracing::warn!(
                user_id = %target.user_id,
                platform = %target.platform,
                handle = %target.handle,
                error = %e,
                "target skipped"
            );
            return result;
        }
    };

    result.followers = visit.output.followers();
    result.posts = visit.output.posts();
    let Some(followers) = result.followers else {
        tracing::warn!(
            user_id = %target.user_id,
            platform = %target.platform,
            handle = %target.handle,
            rounds = visit.output.followers.rounds,
            "no positive follower count, leaving stored values untouched"
        );
        return result;
    };

    let update = UserUpdate::counts(target.user_id, target.platform, Some(followers), result.posts);
    match store.apply(&update).await {
        Ok(()) => {
            result.succeeded = true;
            tracing::info!(
                user_id = %target.user_id,
                platform = %target.platform,
                handle = %target.handle,
                followers,
                posts = ?result.posts,
                attempts = visit.attempts,
                "counts updated"
            );
        }
        Err(e) => {
            tracing::error!(
                user_id = %target.user_id,
                platform = %target.platform,
                error = %format!("{e:#}"),
                "failed to store counts"
            );
        }
    }
    result
}

#[cfg(test)]
#[path = "monitor_test.rs"]
mod tests;
