//! Per-cycle target selection.
//!
//! Monitoring scrapes every declared handle. Validation only revisits a
//! (user, platform) pair when its status is still unresolved or its handle
//! changed since the previous cycle, because every check costs a full page
//! load on a rate-limited third-party site.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::types::{Platform, UserRecord, ValidationStatus};

/// A (user, platform) pair with the normalized handle to scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user_id: Uuid,
    pub platform: Platform,
    pub handle: String,
}

/// Normalized handles for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformHandles {
    pub instagram: Option<String>,
    pub tiktok: Option<String>,
}

impl PlatformHandles {
    #[must_use]
    pub fn of(user: &UserRecord) -> Self {
        Self {
            instagram: user.handle(Platform::Instagram),
            tiktok: user.handle(Platform::Tiktok),
        }
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Instagram => self.instagram.as_deref(),
            Platform::Tiktok => self.tiktok.as_deref(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instagram.is_none() && self.tiktok.is_none()
    }
}

/// `user id -> handles` as observed at the end of a validation cycle.
///
/// Held only in memory and threaded from one cycle into the next; a fresh
/// process starts from an empty snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleSnapshot {
    users: BTreeMap<Uuid, PlatformHandles>,
}

impl HandleSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from user rows, skipping users with no usable handle.
    #[must_use]
    pub fn from_users(users: &[UserRecord]) -> Self {
        let users = users
            .iter()
            .map(|u| (u.id, PlatformHandles::of(u)))
            .filter(|(_, handles)| !handles.is_empty())
            .collect();
        Self { users }
    }

    pub fn insert(&mut self, user_id: Uuid, handles: PlatformHandles) {
        self.users.insert(user_id, handles);
    }

    #[must_use]
    pub fn get(&self, user_id: &Uuid) -> Option<&PlatformHandles> {
        self.users.get(user_id)
    }

    #[must_use]
    pub fn contains(&self, user_id: &Uuid) -> bool {
        self.users.contains_key(user_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.users.keys()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleChange {
    pub user_id: Uuid,
    pub platform: Platform,
    pub previous: String,
    pub current: String,
}

/// Differences between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub new_users: BTreeSet<Uuid>,
    pub gone_users: BTreeSet<Uuid>,
    pub changes: Vec<HandleChange>,
}

impl SnapshotDiff {
    /// A handle counts as changed only when both sides are present and differ.
    #[must_use]
    pub fn compute(previous: &HandleSnapshot, current: &HandleSnapshot) -> Self {
        let mut diff = SnapshotDiff::default();

        for (user_id, now) in &current.users {
            let Some(before) = previous.users.get(user_id) else {
                diff.new_users.insert(*user_id);
                continue;
            };
            for platform in Platform::ALL {
                if let (Some(old), Some(new)) = (before.get(platform), now.get(platform)) {
                    if old != new {
                        diff.changes.push(HandleChange {
                            user_id: *user_id,
                            platform,
                            previous: old.to_owned(),
                            current: new.to_owned(),
                        });
                    }
                }
            }
        }

        diff.gone_users = previous
            .users
            .keys()
            .filter(|id| !current.users.contains_key(id))
            .copied()
            .collect();

        diff
    }

    #[must_use]
    pub fn changed(&self, user_id: &Uuid, platform: Platform) -> bool {
        self.changes
            .iter()
            .any(|c| c.user_id == *user_id && c.platform == platform)
    }

    #[must_use]
    pub fn changed_count(&self, platform: Platform) -> usize {
        self.changes.iter().filter(|c| c.platform == platform).count()
    }

    #[must_use]
    pub fn changed_users(&self) -> BTreeSet<Uuid> {
        self.changes.iter().map(|c| c.user_id).collect()
    }
}

/// Users whose stored status is unresolved for a platform they declared.
#[must_use]
pub fn pending_status_ids(users: &[UserRecord]) -> BTreeSet<Uuid> {
    users
        .iter()
        .filter(|u| {
            Platform::ALL.into_iter().any(|p| {
                u.handle(p).is_some() && u.status(p) == Some(ValidationStatus::Unvalidated)
            })
        })
        .map(|u| u.id)
        .collect()
}

/// Candidate users for this validation cycle: unresolved status, newly
/// observed, or an edited handle.
#[must_use]
pub fn compute_targets(
    current: &HandleSnapshot,
    previous: &HandleSnapshot,
    status_filtered: &BTreeSet<Uuid>,
) -> BTreeSet<Uuid> {
    let diff = SnapshotDiff::compute(previous, current);
    let mut targets = status_filtered.clone();
    targets.extend(diff.new_users);
    targets.extend(diff.changes.into_iter().map(|c| c.user_id));
    targets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetReason {
    Unvalidated,
    HandleChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationTarget {
    pub user_id: Uuid,
    pub platform: Platform,
    pub handle: String,
    pub reason: TargetReason,
}

/// Narrows candidate users to the platforms that actually need a check.
///
/// Being newly observed puts a user on the candidate list but never forces a
/// platform check by itself: the platform must be unresolved or edited.
#[must_use]
pub fn plan_validation(
    users: &[UserRecord],
    candidates: &BTreeSet<Uuid>,
    diff: &SnapshotDiff,
) -> Vec<ValidationTarget> {
    let mut planned = Vec::new();
    for user in users.iter().filter(|u| candidates.contains(&u.id)) {
        for platform in Platform::ALL {
            let Some(handle) = user.handle(platform) else {
                continue;
            };
            let reason = if user.status(platform) == Some(ValidationStatus::Unvalidated) {
                TargetReason::Unvalidated
            } else if diff.changed(&user.id, platform) {
                TargetReason::HandleChanged
            } else {
                continue;
            };
            planned.push(ValidationTarget {
                user_id: user.id,
                platform,
                handle,
                reason,
            });
        }
    }
    planned
}

/// Every declared handle, one target per (user, platform).
#[must_use]
pub fn monitor_targets(users: &[UserRecord]) -> Vec<Target> {
    users
        .iter()
        .flat_map(|u| {
            Platform::ALL.into_iter().filter_map(move |platform| {
                u.handle(platform).map(|handle| Target {
                    user_id: u.id,
                    platform,
                    handle,
                })
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "targeting_test.rs"]
mod tests;
