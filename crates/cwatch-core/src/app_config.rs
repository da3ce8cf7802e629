use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    // Browser
    pub show_browser: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,

    // Cycle cadence
    pub monitor_interval_secs: u64,
    pub validate_interval_secs: u64,
    pub inter_target_delay_ms: u64,

    // Sampling
    pub sample_count: usize,
    pub sample_interval_ms: u64,
    pub sample_timeout_ms: u64,
    pub fast_max_attempts: u32,
    pub fast_retry_delay_ms: u64,
    /// `None` retries followers until a positive value is read.
    pub follower_max_rounds: Option<u32>,
    pub follower_retry_delay_ms: u64,
    pub query_timeout_ms: u64,

    // Page session
    pub nav_timeouts_ms: Vec<u64>,
    pub network_idle_timeout_ms: u64,
    pub max_backoff_secs: u64,
    pub timeout_restart_interval: u32,
    pub recovery_restart_interval: u32,
    /// `None` keeps retrying a monitored target until it loads.
    pub monitor_max_attempts: Option<u32>,
    pub validate_max_attempts: Option<u32>,
    /// Navigation timeout for validation visits; profile pages load slowly.
    pub validate_nav_timeout_ms: u64,

    pub utc_offset_hours: i32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("show_browser", &self.show_browser)
            .field("chrome_executable", &self.chrome_executable)
            .field("user_agent", &self.user_agent)
            .field("monitor_interval_secs", &self.monitor_interval_secs)
            .field("validate_interval_secs", &self.validate_interval_secs)
            .field("inter_target_delay_ms", &self.inter_target_delay_ms)
            .field("sample_count", &self.sample_count)
            .field("sample_interval_ms", &self.sample_interval_ms)
            .field("sample_timeout_ms", &self.sample_timeout_ms)
            .field("fast_max_attempts", &self.fast_max_attempts)
            .field("fast_retry_delay_ms", &self.fast_retry_delay_ms)
            .field("follower_max_rounds", &self.follower_max_rounds)
            .field("follower_retry_delay_ms", &self.follower_retry_delay_ms)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .field("nav_timeouts_ms", &self.nav_timeouts_ms)
            .field("network_idle_timeout_ms", &self.network_idle_timeout_ms)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("timeout_restart_interval", &self.timeout_restart_interval)
            .field("recovery_restart_interval", &self.recovery_restart_interval)
            .field("monitor_max_attempts", &self.monitor_max_attempts)
            .field("validate_max_attempts", &self.validate_max_attempts)
            .field("validate_nav_timeout_ms", &self.validate_nav_timeout_ms)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .finish()
    }
}
