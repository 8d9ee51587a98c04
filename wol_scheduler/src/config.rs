//! Configuration module for the Wake-on-LAN scheduler
//!
//! Settings come from `WOL_*` environment variables, resolved once at start-up.
//! Unparseable values are logged and replaced by their defaults.

use std::env;
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use once_cell::sync::Lazy;

use crate::recurrence::ScheduleZone;

/// Default database URL (SQLite file next to the working directory)
const DEFAULT_DATABASE_URL: &str = "sqlite://wol_scheduler.db?mode=rwc";

const DEFAULT_SEND_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 250;
const DEFAULT_STATUS_POLL_SECS: u64 = 60;
const DEFAULT_FIRE_DEADLINE_SECS: u64 = 180;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Global timezone configuration
///
/// Configured via `WOL_TIMEZONE_OFFSET_HOURS` as a fixed override; when unset, schedules
/// follow host local time including daylight-saving changes.
pub static TIMEZONE: Lazy<ScheduleZone> =
    Lazy::new(|| resolve_timezone(env::var("WOL_TIMEZONE_OFFSET_HOURS").ok().as_deref()));

fn resolve_timezone(raw: Option<&str>) -> ScheduleZone {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ScheduleZone::Local;
    };
    match raw.parse::<i32>().ok().and_then(|h| FixedOffset::east_opt(h * 3600)) {
        Some(offset) => ScheduleZone::Fixed(offset),
        None => {
            crate::warn!(
                "[CONFIG] Invalid WOL_TIMEZONE_OFFSET_HOURS {:?}, using local time",
                raw
            );
            ScheduleZone::Local
        }
    }
}

/// Get the configured timezone
pub fn get_timezone() -> ScheduleZone {
    *TIMEZONE
}

/// Get current time in configured timezone
pub fn now_in_timezone() -> chrono::DateTime<FixedOffset> {
    get_timezone().wall_clock(Utc::now())
}

/// Get the database URL
///
/// Configured via `WOL_DATABASE_URL`; an empty value means the default.
pub fn get_database_url() -> String {
    env::var("WOL_DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Runtime settings for a scheduler instance
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub database_url: String,
    pub timezone: ScheduleZone,
    pub send_timeout: Duration,
    pub probe_timeout: Duration,
    pub status_poll_interval: Duration,
    pub fire_deadline: Duration,
    /// Whether the platform grants exact wake timers
    pub exact_timers: bool,
    pub log_level: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            timezone: ScheduleZone::Local,
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            status_poll_interval: Duration::from_secs(DEFAULT_STATUS_POLL_SECS),
            fire_deadline: Duration::from_secs(DEFAULT_FIRE_DEADLINE_SECS),
            exact_timers: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            database_url: get("WOL_DATABASE_URL").unwrap_or(defaults.database_url),
            timezone: resolve_timezone(get("WOL_TIMEZONE_OFFSET_HOURS").as_deref()),
            send_timeout: Duration::from_secs(parse_or(
                get("WOL_SEND_TIMEOUT_SECS"),
                "WOL_SEND_TIMEOUT_SECS",
                DEFAULT_SEND_TIMEOUT_SECS,
            )),
            probe_timeout: Duration::from_millis(parse_or(
                get("WOL_PROBE_TIMEOUT_MS"),
                "WOL_PROBE_TIMEOUT_MS",
                DEFAULT_PROBE_TIMEOUT_MS,
            )),
            status_poll_interval: Duration::from_secs(parse_or(
                get("WOL_STATUS_POLL_SECS"),
                "WOL_STATUS_POLL_SECS",
                DEFAULT_STATUS_POLL_SECS,
            )),
            fire_deadline: Duration::from_secs(parse_or(
                get("WOL_FIRE_DEADLINE_SECS"),
                "WOL_FIRE_DEADLINE_SECS",
                DEFAULT_FIRE_DEADLINE_SECS,
            )),
            exact_timers: parse_bool_or(get("WOL_EXACT_TIMERS"), defaults.exact_timers),
            log_level: get("WOL_LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        if config.send_timeout >= config.fire_deadline {
            crate::warn!(
                "[CONFIG] Send timeout {:?} is not below the fire deadline {:?}, scheduled wakes will be cut short",
                config.send_timeout,
                config.fire_deadline
            );
        }
        config
    }
}

fn parse_or(raw: Option<String>, key: &str, default: u64) -> u64 {
    match raw {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => value,
            _ => {
                crate::warn!("[CONFIG] Invalid {} {:?}, using {}", key, raw, default);
                default
            }
        },
    }
}

fn parse_bool_or(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            crate::warn!("[CONFIG] Invalid WOL_EXACT_TIMERS {:?}, using {}", v, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SchedulerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.send_timeout, Duration::from_secs(15));
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.status_poll_interval, Duration::from_secs(60));
        assert_eq!(config.fire_deadline, Duration::from_secs(180));
        assert!(config.exact_timers);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.timezone, ScheduleZone::Local);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = SchedulerConfig::from_lookup(lookup(&[
            ("WOL_DATABASE_URL", "sqlite::memory:"),
            ("WOL_TIMEZONE_OFFSET_HOURS", "-5"),
            ("WOL_SEND_TIMEOUT_SECS", "3"),
            ("WOL_EXACT_TIMERS", "off"),
        ]));
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(
            config.timezone,
            ScheduleZone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap())
        );
        assert_eq!(config.send_timeout, Duration::from_secs(3));
        assert!(!config.exact_timers);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = SchedulerConfig::from_lookup(lookup(&[
            ("WOL_TIMEZONE_OFFSET_HOURS", "+99"),
            ("WOL_PROBE_TIMEOUT_MS", "fast"),
            ("WOL_FIRE_DEADLINE_SECS", "0"),
            ("WOL_EXACT_TIMERS", "maybe"),
        ]));
        assert_eq!(config.timezone, ScheduleZone::Local);
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.fire_deadline, Duration::from_secs(180));
        assert!(config.exact_timers);
    }

    #[test]
    fn test_now_in_timezone_uses_configured_zone() {
        let before = Utc::now();
        let now = now_in_timezone();
        assert!(now.with_timezone(&Utc) >= before);
        assert_eq!(now.offset(), get_timezone().wall_clock(before).offset());
    }
}
