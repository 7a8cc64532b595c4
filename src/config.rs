use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, Weekday};
use dotenvy::dotenv;

use crate::notify::QueueSettings;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    // Attendance rules
    pub geofence_radius_meters: f64,
    pub weekly_off_day: Weekday,
    pub utc_offset_minutes: i32,
    pub recent_limit: u32,

    // Notifications
    pub notify_max_retries: u32,
    pub notify_retry_delay_ms: u64,
    pub notify_pacing_ms: u64,
    pub notify_send_timeout_ms: u64,
    pub notify_webhook_url: Option<String>,

    pub center_cache_ttl_secs: u64,
}

/// Rules applied by the attendance gate and the read views.
#[derive(Debug, Clone)]
pub struct AttendancePolicy {
    pub radius_meters: f64,
    pub weekly_off: Weekday,
    /// Service time zone; decides what "today" is
    pub utc_offset: FixedOffset,
    pub recent_limit: u32,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} is invalid ({raw}): {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,

            geofence_radius_meters: or_default("GEOFENCE_RADIUS_METERS", 100.0)?,
            weekly_off_day: or_default("WEEKLY_OFF_DAY", Weekday::Sun)?,
            utc_offset_minutes: or_default("SERVICE_UTC_OFFSET_MINUTES", 330)?,
            recent_limit: or_default("RECENT_LIMIT", 20)?,

            notify_max_retries: or_default("NOTIFY_MAX_RETRIES", 3)?,
            notify_retry_delay_ms: or_default("NOTIFY_RETRY_DELAY_MS", 5000)?,
            notify_pacing_ms: or_default("NOTIFY_PACING_MS", 100)?,
            notify_send_timeout_ms: or_default("NOTIFY_SEND_TIMEOUT_MS", 10_000)?,
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),

            center_cache_ttl_secs: or_default("CENTER_CACHE_TTL_SECS", 300)?,
        })
    }

    pub fn policy(&self) -> Result<AttendancePolicy> {
        let utc_offset = self
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                anyhow!(
                    "SERVICE_UTC_OFFSET_MINUTES out of range: {}",
                    self.utc_offset_minutes
                )
            })?;

        if !(self.geofence_radius_meters.is_finite() && self.geofence_radius_meters > 0.0) {
            return Err(anyhow!("GEOFENCE_RADIUS_METERS must be a positive number"));
        }

        Ok(AttendancePolicy {
            radius_meters: self.geofence_radius_meters,
            weekly_off: self.weekly_off_day,
            utc_offset,
            recent_limit: self.recent_limit.max(1),
        })
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_retries: self.notify_max_retries.max(1),
            retry_delay: Duration::from_millis(self.notify_retry_delay_ms),
            pacing: Duration::from_millis(self.notify_pacing_ms),
            send_timeout: Duration::from_millis(self.notify_send_timeout_ms.max(1)),
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            database_url: "mysql://localhost/attendance".into(),
            jwt_secret: crate::auth::jwt::testing::SECRET.into(),
            server_addr: "127.0.0.1:8080".into(),
            api_prefix: "/api".into(),
            rate_protected_per_min: 1000,
            geofence_radius_meters: 100.0,
            weekly_off_day: Weekday::Sun,
            utc_offset_minutes: 330,
            recent_limit: 20,
            notify_max_retries: 3,
            notify_retry_delay_ms: 5000,
            notify_pacing_ms: 100,
            notify_send_timeout_ms: 10_000,
            notify_webhook_url: None,
            center_cache_ttl_secs: 300,
        }
    }
}
