use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::handles::normalize_handle;

/// Social platform whose counters are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Instagram, Platform::Tiktok];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" | "ig" => Ok(Platform::Instagram),
            "tiktok" | "tt" => Ok(Platform::Tiktok),
            other => Err(UnknownPlatform(other.to_owned())),
        }
    }
}

/// Counter read from a platform's counter page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Followers,
    Posts,
}

impl Metric {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Followers => "followers",
            Metric::Posts => "posts",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-platform handle validation state as stored on the user record.
///
/// The stored strings (`belum`, `benar`, `salah`) are shared with the
/// application that owns the user table and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[serde(rename = "belum")]
    Unvalidated,
    #[serde(rename = "benar")]
    Valid,
    #[serde(rename = "salah")]
    Invalid,
}

impl ValidationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Unvalidated => "belum",
            ValidationStatus::Valid => "benar",
            ValidationStatus::Invalid => "salah",
        }
    }

    /// Interprets a raw stored status.
    ///
    /// A missing, empty, or `none` value means the handle was never checked
    /// and maps to [`ValidationStatus::Unvalidated`]. Values this system does
    /// not recognise yield `None` so they are left alone.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Option<Self> {
        let Some(raw) = raw else {
            return Some(ValidationStatus::Unvalidated);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "belum" => Some(ValidationStatus::Unvalidated),
            "benar" => Some(ValidationStatus::Valid),
            "salah" => Some(ValidationStatus::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slice of a user row this system reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub instagram_handle: Option<String>,
    pub tiktok_handle: Option<String>,
    pub instagram_status: Option<String>,
    pub tiktok_status: Option<String>,
}

impl UserRecord {
    /// Raw handle exactly as the user entered it.
    #[must_use]
    pub fn raw_handle(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Instagram => self.instagram_handle.as_deref(),
            Platform::Tiktok => self.tiktok_handle.as_deref(),
        }
    }

    /// Normalized handle, `None` when absent or blank.
    #[must_use]
    pub fn handle(&self, platform: Platform) -> Option<String> {
        self.raw_handle(platform).and_then(normalize_handle)
    }

    #[must_use]
    pub fn status(&self, platform: Platform) -> Option<ValidationStatus> {
        let raw = match platform {
            Platform::Instagram => self.instagram_status.as_deref(),
            Platform::Tiktok => self.tiktok_status.as_deref(),
        };
        ValidationStatus::from_stored(raw)
    }
}

/// Partial update for one platform's fields on a user row.
///
/// The outer `Option` says whether a field is written at all; for counts the
/// inner `Option` is the value, where `None` stores `NULL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    pub user_id: Uuid,
    pub platform: Platform,
    pub followers: Option<Option<i64>>,
    pub posts: Option<Option<i64>>,
    pub status: Option<ValidationStatus>,
}

impl UserUpdate {
    /// Monitoring write-back: both counters are always written, missing ones as `NULL`.
    #[must_use]
    pub fn counts(user_id: Uuid, platform: Platform, followers: Option<i64>, posts: Option<i64>) -> Self {
        Self {
            user_id,
            platform,
            followers: Some(followers),
            posts: Some(posts),
            status: None,
        }
    }

    /// Validation write-back. Counters are only written when known, and posts
    /// only for a handle that validated.
    #[must_use]
    pub fn validation(
        user_id: Uuid,
        platform: Platform,
        status: ValidationStatus,
        followers: Option<i64>,
        posts: Option<i64>,
    ) -> Self {
        let posts = match (status, posts) {
            (ValidationStatus::Valid, Some(p)) => Some(Some(p)),
            _ => None,
        };
        Self {
            user_id,
            platform,
            followers: followers.map(Some),
            posts,
            status: Some(status),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.followers.is_none() && self.posts.is_none() && self.status.is_none()
    }
}
