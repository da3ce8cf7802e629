use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(var, e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<usize>()
            .map_err(|e| invalid(var, e))
    };

    // Unset or blank means "no limit".
    let parse_optional_u32 = |var: &str| -> Result<Option<u32>, ConfigError> {
        match lookup(var) {
            Ok(raw) if !raw.trim().is_empty() => {
                let value = raw.trim().parse::<u32>().map_err(|e| invalid(var, e))?;
                if value == 0 {
                    return Err(invalid(var, "must be at least 1 when set"));
                }
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("CWATCH_ENV", "development"))?;
    let log_level = or_default("CWATCH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("CWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let show_browser = parse_bool("CWATCH_SHOW_BROWSER", &or_default("CWATCH_SHOW_BROWSER", "false"))?;
    let chrome_executable = lookup("CWATCH_CHROME_EXECUTABLE")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(std::path::PathBuf::from);
    let user_agent = or_default("CWATCH_USER_AGENT", DEFAULT_USER_AGENT);

    let monitor_interval_secs = parse_u64("CWATCH_MONITOR_INTERVAL_SECS", "30")?;
    let validate_interval_secs = parse_u64("CWATCH_VALIDATE_INTERVAL_SECS", "5")?;
    let inter_target_delay_ms = parse_u64("CWATCH_INTER_TARGET_DELAY_MS", "1000")?;

    let sample_count = parse_usize("CWATCH_SAMPLE_COUNT", "3")?;
    if sample_count == 0 {
        return Err(invalid("CWATCH_SAMPLE_COUNT", "must be at least 1"));
    }
    let sample_interval_ms = parse_u64("CWATCH_SAMPLE_INTERVAL_MS", "100")?;
    let sample_timeout_ms = parse_u64("CWATCH_SAMPLE_TIMEOUT_MS", "5000")?;
    let fast_max_attempts = parse_u32("CWATCH_FAST_MAX_ATTEMPTS", "10")?;
    let fast_retry_delay_ms = parse_u64("CWATCH_FAST_RETRY_DELAY_MS", "300")?;
    let follower_max_rounds = parse_optional_u32("CWATCH_FOLLOWER_MAX_ROUNDS")?;
    let follower_retry_delay_ms = parse_u64("CWATCH_FOLLOWER_RETRY_DELAY_MS", "500")?;
    let query_timeout_ms = parse_u64("CWATCH_QUERY_TIMEOUT_MS", "2000")?;
    if query_timeout_ms == 0 {
        return Err(invalid("CWATCH_QUERY_TIMEOUT_MS", "must be positive"));
    }

    let nav_timeouts_ms = parse_timeout_schedule(
        "CWATCH_NAV_TIMEOUTS_MS",
        &or_default("CWATCH_NAV_TIMEOUTS_MS", "3000,5000,8000,12000,15000"),
    )?;
    let network_idle_timeout_ms = parse_u64("CWATCH_NETWORK_IDLE_TIMEOUT_MS", "3000")?;
    let max_backoff_secs = parse_u64("CWATCH_MAX_BACKOFF_SECS", "300")?;
    let timeout_restart_interval = parse_u32("CWATCH_TIMEOUT_RESTART_INTERVAL", "3")?;
    let recovery_restart_interval = parse_u32("CWATCH_RECOVERY_RESTART_INTERVAL", "5")?;
    let monitor_max_attempts = parse_optional_u32("CWATCH_MONITOR_MAX_ATTEMPTS")?;
    let validate_max_attempts = match lookup("CWATCH_VALIDATE_MAX_ATTEMPTS") {
        Ok(_) => parse_optional_u32("CWATCH_VALIDATE_MAX_ATTEMPTS")?,
        Err(_) => Some(1),
    };
    let validate_nav_timeout_ms = parse_u64("CWATCH_VALIDATE_NAV_TIMEOUT_MS", "15000")?;
    if validate_nav_timeout_ms == 0 {
        return Err(invalid("CWATCH_VALIDATE_NAV_TIMEOUT_MS", "must be positive"));
    }

    let utc_offset_hours = or_default("CWATCH_UTC_OFFSET_HOURS", "7")
        .trim()
        .parse::<i32>()
        .map_err(|e| invalid("CWATCH_UTC_OFFSET_HOURS", e))?;
    if !(-12..=14).contains(&utc_offset_hours) {
        return Err(invalid(
            "CWATCH_UTC_OFFSET_HOURS",
            format!("{utc_offset_hours} is outside -12..=14"),
        ));
    }

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        show_browser,
        chrome_executable,
        user_agent,
        monitor_interval_secs,
        validate_interval_secs,
        inter_target_delay_ms,
        sample_count,
        sample_interval_ms,
        sample_timeout_ms,
        fast_max_attempts,
        fast_retry_delay_ms,
        follower_max_rounds,
        follower_retry_delay_ms,
        query_timeout_ms,
        nav_timeouts_ms,
        network_idle_timeout_ms,
        max_backoff_secs,
        timeout_restart_interval,
        recovery_restart_interval,
        monitor_max_attempts,
        validate_max_attempts,
        validate_nav_timeout_ms,
        utc_offset_hours,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s.trim() {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "CWATCH_ENV",
            format!("expected development, test, or production; got {other:?}"),
        )),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
    }
}

/// Comma-separated, non-empty list of positive millisecond timeouts.
fn parse_timeout_schedule(var: &str, raw: &str) -> Result<Vec<u64>, ConfigError> {
    let schedule = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().map_err(|e| invalid(var, e)))
        .collect::<Result<Vec<_>, _>>()?;

    if schedule.is_empty() {
        return Err(invalid(var, "at least one timeout is required"));
    }
    if schedule.contains(&0) {
        return Err(invalid(var, "timeouts must be greater than zero"));
    }
    Ok(schedule)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
