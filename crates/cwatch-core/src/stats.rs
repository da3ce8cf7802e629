use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Platform;

/// Kind of cycle a stats row belongs to. Only monitoring cycles are recorded;
/// validation passes report through logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    Monitor,
}

impl CycleType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CycleType::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for CycleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one (user, platform) target within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    pub user_id: Uuid,
    pub handle: String,
    pub platform: Platform,
    pub followers: Option<i64>,
    pub posts: Option<i64>,
    pub succeeded: bool,
}

/// Aggregated record of one full monitoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    pub timestamp: DateTime<Utc>,
    pub cycle_type: CycleType,
    /// 1-based count of cycles of this type recorded on the local day.
    pub session_number: i32,
    pub success_count: u32,
    pub fail_count: u32,
    pub duration_seconds: f64,
    pub per_target_results: Vec<TargetResult>,
}

impl CycleStats {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.success_count + self.fail_count
    }

    /// Fraction of targets that succeeded, `0.0` for an empty cycle.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => f64::from(self.success_count) / f64::from(total),
        }
    }
}
