//! Validation workflow: check handles that are unresolved or were edited.
//!
//! Each cycle folds the previous handle snapshot into the next one. A failed
//! cycle leaves the previous snapshot in place so its changes are seen again.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;

use cwatch_core::{
    compute_targets, pending_status_ids, plan_validation, HandleSnapshot, Platform, SnapshotDiff,
    TargetReason, UserUpdate, ValidationStatus, ValidationTarget,
};
use cwatch_scraper::{BrowserDriver, CheckHandle, PageSession, SiteProfile};

use crate::schedule::{inter_target_delay, Ticker};
use crate::settings::CycleSettings;
use crate::store::UserStore;

const LISTED_INVALID: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PlatformTally {
    pub valid: u32,
    pub invalid: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ValidationReport {
    pub per_platform: BTreeMap<Platform, PlatformTally>,
    /// `@handle (platform)` for every handle found invalid, in check order.
    pub invalid_handles: Vec<String>,
}

impl ValidationReport {
    fn tally(&mut self, platform: Platform) -> &mut PlatformTally {
        self.per_platform.entry(platform).or_default()
    }

    fn record(&mut self, target: &ValidationTarget, status: Option<ValidationStatus>) {
        match status {
            Some(ValidationStatus::Valid) => self.tally(target.platform).valid += 1,
            Some(ValidationStatus::Invalid) => {
                self.tally(target.platform).invalid += 1;
                self.invalid_handles
                    .push(format!("@{} ({})", target.handle, target.platform));
            }
            Some(ValidationStatus::Unvalidated) | None => self.tally(target.platform).failed += 1,
        }
    }

    pub(crate) fn checked(&self) -> u32 {
        self.per_platform
            .values()
            .map(|t| t.valid + t.invalid + t.failed)
            .sum()
    }

    /// First few invalid handles, then a `+N more` tail.
    pub(crate) fn invalid_summary(&self) -> Option<String> {
        if self.invalid_handles.is_empty() {
            return None;
        }
        let mut summary = self
            .invalid_handles
            .iter()
            .take(LISTED_INVALID)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let rest = self.invalid_handles.len().saturating_sub(LISTED_INVALID);
        if rest > 0 {
            let _ = write!(summary, " +{rest} more");
        }
        Some(summary)
    }
}

/// Runs validation cycles until `shutdown` resolves (or once), then releases
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
    S: UserStore,
{
    tokio::pin!(shutdown);
    let mut ticker = Ticker::new(settings.period);
    let mut snapshot = HandleSnapshot::new();

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            () = ticker.wait() => {}
        }

        let outcome = tokio::select! {
            () = &mut shutdown => None,
            result = run_cycle(&snapshot, store, session, settings) => Some(result),
        };
        match outcome {
            None => break,
            Some(Ok((next, _))) => snapshot = next,
            Some(Err(e)) => {
                tracing::error!(error = %format!("{e:#}"), "validation cycle aborted");
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

fn log_diff(previous: &HandleSnapshot, current: &HandleSnapshot, diff: &SnapshotDiff) {
    tracing::info!(
        previous_users = previous.len(),
        current_users = current.len(),
        new = diff.new_users.len(),
        gone = diff.gone_users.len(),
        instagram_changed = diff.changed_count(Platform::Instagram),
        tiktok_changed = diff.changed_count(Platform::Tiktok),
        "handle snapshot compared"
    );
    for change in &diff.changes {
        tracing::info!(
            user_id = %change.user_id,
            platform = %change.platform,
            from = %change.previous,
            to = %change.current,
            "handle edited"
        );
    }
}

/// One validation pass. Returns the snapshot to compare against next time.
///
/// A handle edit whose check did not complete keeps its previous value in the
/// returned snapshot, so the edit is detected again on the next cycle.
pub(crate) async fn run_cycle<D, S>(
    previous: &HandleSnapshot,
    store: &S,
    session: &mut PageSession<D>,
    settings: &CycleSettings,
) -> anyhow::Result<(HandleSnapshot, ValidationReport)>
where
    D: BrowserDriver,
    S: UserStore,
{
    let users = store.validation_candidates().await?;
    let current = HandleSnapshot::from_users(&users);
    let diff = SnapshotDiff::compute(previous, &current);
    log_diff(previous, &current, &diff);

    let pending = pending_status_ids(&users);
    let candidates = compute_targets(&current, previous, &pending);
    let planned = plan_validation(&users, &candidates, &diff);

    let mut next = current;
    let mut report = ValidationReport::default();
    if planned.is_empty() {
        tracing::debug!("nothing to validate");
        return Ok((next, report));
    }
    tracing::info!(
        candidates = candidates.len(),
        checks = planned.len(),
        "validation cycle started"
    );

    session.begin_cycle().await?;
    for (i, target) in planned.iter().enumerate() {
        let delay = inter_target_delay(i + 1, settings.inter_target_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let status = check_target(session, store, settings, target).await;
        report.record(target, status);
        if status.is_none() && target.reason == TargetReason::HandleChanged {
            keep_previous_handle(&mut next, previous, target);
        }
    }
    session.end_cycle().await?;

    for (platform, tally) in &report.per_platform {
        tracing::info!(
            platform = %platform,
            valid = tally.valid,
            invalid = tally.invalid,
            failed = tally.failed,
            "validation results"
        );
    }
    if let Some(summary) = report.invalid_summary() {
        tracing::info!(handles = %summary, "invalid handles");
    }
    tracing::info!(checked = report.checked(), "validation cycle complete");
    Ok((next, report))
}

fn keep_previous_handle(next: &mut HandleSnapshot, previous: &HandleSnapshot, target: &ValidationTarget) {
    let Some(before) = previous.get(&target.user_id).and_then(|h| h.get(target.platform)) else {
        return;
    };
    let mut handles = next.get(&target.user_id).cloned().unwrap_or_default();
    let restored = Some(before.to_owned());
    match target.platform {
        Platform::Instagram => handles.instagram = restored,
        Platform::Tiktok => handles.tiktok = restored,
    }
    next.insert(target.user_id, handles);
}

/// Checks one handle and writes the verdict. `None` when no verdict was
/// stored.
async fn check_target<D, S>(
    session: &mut PageSession<D>,
    store: &S,
    settings: &CycleSettings,
    target: &ValidationTarget,
) -> Option<ValidationStatus>
where
    D: BrowserDriver,
    S: UserStore,
{
    let profile = SiteProfile::for_platform(target.platform).with_query_timeout(settings.plan.query_timeout);
    let url = profile.url(&target.handle);
    let mut task = CheckHandle::new(&profile, &target.handle, &settings.plan, &settings.verify);

    let check = match session.visit(&url, Some(profile.settle_marker()), &mut task).await {
        Ok(visit) => visit.output,
        Err(e) => {
            tracing::warn!(
                user_id = %target.user_id,
                platform = %target.platform,
                handle = %target.handle,
                error = %e,
                "handle check did not complete"
            );
            return None;
        }
    };

    let update = UserUpdate::validation(
        target.user_id,
        target.platform,
        check.status,
        check.followers,
        check.posts,
    );
    if let Err(e) = store.apply(&update).await {
        tracing::error!(
            user_id = %target.user_id,
            platform = %target.platform,
            error = %format!("{e:#}"),
            "failed to store validation result"
        );
        return None;
    }

    tracing::info!(
        user_id = %target.user_id,
        platform = %target.platform,
        handle = %target.handle,
        reason = ?target.reason,
        status = %check.status,
        followers = ?check.followers,
        posts = ?check.posts,
        "handle checked"
    );
    Some(check.status)
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
