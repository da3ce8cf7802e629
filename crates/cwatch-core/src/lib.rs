pub mod app_config;
pub mod clock;
pub mod config;
pub mod handles;
pub mod stats;
pub mod targeting;
pub mod types;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use clock::{format_duration_hms, format_local_stamp, local_day_bounds, utc_offset};
pub use config::{load_app_config, load_app_config_from_env};
pub use handles::normalize_handle;
pub use stats::{CycleStats, CycleType, TargetResult};
pub use targeting::{
    compute_targets, monitor_targets, pending_status_ids, plan_validation, HandleChange,
    HandleSnapshot, PlatformHandles, SnapshotDiff, Target, TargetReason, ValidationTarget,
};
pub use types::{Metric, Platform, UnknownPlatform, UserRecord, UserUpdate, ValidationStatus};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
