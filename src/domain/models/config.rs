use serde::{Deserialize, Serialize};

/// Main configuration structure for Meridian
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Engine dispatch configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Global and per-tenant rate ceilings
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    /// Fallback business hours when a tenant defines none
    #[serde(default)]
    pub business_hours: Option<BusinessHours>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".meridian/meridian.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for daily-rotated log files
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// Engine dispatch and pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Number of worker partitions consuming the event queue
    #[serde(default = "default_worker_partitions")]
    pub worker_partitions: usize,

    /// Bounded queue capacity per worker partition
    #[serde(default = "default_partition_queue_capacity")]
    pub partition_queue_capacity: usize,

    /// Seconds an event stays in the dedup window
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Per-action execution deadline in milliseconds
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    /// Pause between two rules firing for the same event, in milliseconds
    #[serde(default = "default_inter_rule_delay_ms")]
    pub inter_rule_delay_ms: u64,

    /// TTL of the tenant automation-enabled cache, in seconds
    #[serde(default = "default_tenant_cache_ttl_secs")]
    pub tenant_cache_ttl_secs: u64,

    /// Days of execution history to retain
    #[serde(default = "default_execution_retention_days")]
    pub execution_retention_days: u32,
}

const fn default_worker_partitions() -> usize {
    4
}

const fn default_partition_queue_capacity() -> usize {
    256
}

const fn default_dedup_window_secs() -> u64 {
    5
}

const fn default_action_timeout_ms() -> u64 {
    10_000
}

const fn default_inter_rule_delay_ms() -> u64 {
    50
}

const fn default_tenant_cache_ttl_secs() -> u64 {
    30
}

const fn default_execution_retention_days() -> u32 {
    90
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_partitions: default_worker_partitions(),
            partition_queue_capacity: default_partition_queue_capacity(),
            dedup_window_secs: default_dedup_window_secs(),
            action_timeout_ms: default_action_timeout_ms(),
            inter_rule_delay_ms: default_inter_rule_delay_ms(),
            tenant_cache_ttl_secs: default_tenant_cache_ttl_secs(),
            execution_retention_days: default_execution_retention_days(),
        }
    }
}

/// Global and per-tenant fixed-window ceilings. Zero disables a ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitsConfig {
    #[serde(default = "default_global_per_minute")]
    pub global_per_minute: u32,

    #[serde(default = "default_global_per_hour")]
    pub global_per_hour: u32,

    #[serde(default = "default_tenant_per_minute")]
    pub tenant_per_minute: u32,

    #[serde(default = "default_tenant_per_hour")]
    pub tenant_per_hour: u32,
}

const fn default_global_per_minute() -> u32 {
    600
}

const fn default_global_per_hour() -> u32 {
    10_000
}

const fn default_tenant_per_minute() -> u32 {
    60
}

const fn default_tenant_per_hour() -> u32 {
    1_000
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            global_per_minute: default_global_per_minute(),
            global_per_hour: default_global_per_hour(),
            tenant_per_minute: default_tenant_per_minute(),
            tenant_per_hour: default_tenant_per_hour(),
        }
    }
}

/// Weekly business-hours schedule in a fixed timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BusinessHours {
    /// IANA timezone name, e.g. `America/Sao_Paulo`
    pub timezone: String,

    /// Open intervals; days absent from the list are closed
    pub days: Vec<DayHours>,
}

/// Open interval for one weekday, `HH:MM` local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DayHours {
    /// 0 = Monday .. 6 = Sunday
    pub weekday: u8,
    pub open: String,
    pub close: String,
}

impl BusinessHours {
    /// Whether the given instant falls inside the schedule. Returns `None`
    /// when the timezone or an interval cannot be parsed.
    pub fn contains(&self, instant: chrono::DateTime<chrono::Utc>) -> Option<bool> {
        use chrono::{Datelike, Timelike};

        let tz: chrono_tz::Tz = self.timezone.parse().ok()?;
        let local = instant.with_timezone(&tz);
        let weekday = local.weekday().num_days_from_monday() as u8;
        let minute_of_day = local.hour() * 60 + local.minute();

        for day in &self.days {
            if day.weekday != weekday {
                continue;
            }
            let open = parse_minutes(&day.open)?;
            let close = parse_minutes(&day.close)?;
            if minute_of_day >= open && minute_of_day < close {
                return Some(true);
            }
        }
        Some(false)
    }
}

fn parse_minutes(hhmm: &str) -> Option<u32> {
    let (h, m) = hhmm.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.worker_partitions, 4);
        assert_eq!(config.rate_limits.global_per_minute, 600);
        assert_eq!(config.database.path, ".meridian/meridian.db");
    }

    #[test]
    fn test_business_hours_contains() {
        let hours = BusinessHours {
            timezone: "UTC".into(),
            days: vec![DayHours {
                weekday: 0, // Monday
                open: "09:00".into(),
                close: "18:00".into(),
            }],
        };

        // Monday 2025-01-06 10:00 UTC
        let inside = chrono::Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        assert_eq!(hours.contains(inside), Some(true));

        // Monday 20:00 is after close
        let evening = chrono::Utc.with_ymd_and_hms(2025, 1, 6, 20, 0, 0).unwrap();
        assert_eq!(hours.contains(evening), Some(false));

        // Tuesday is closed entirely
        let tuesday = chrono::Utc.with_ymd_and_hms(2025, 1, 7, 10, 0, 0).unwrap();
        assert_eq!(hours.contains(tuesday), Some(false));
    }

    #[test]
    fn test_business_hours_bad_timezone() {
        let hours = BusinessHours {
            timezone: "Not/AZone".into(),
            days: vec![],
        };
        assert_eq!(hours.contains(chrono::Utc::now()), None);
    }
}
