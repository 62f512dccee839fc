/// Runtime configuration.
///
/// Values come from `CLINICAGENDA_*` environment variables, optionally
/// seeded from a `.env` file. Anything unset keeps its default.

use crate::dates::{parse_time, DEFAULT_TIMEZONE};
use crate::error::{AgendaError, Result};
use crate::models::{OwnerId, WorkingHours};
use chrono_tz::Tz;
use std::time::Duration;
use uuid::Uuid;

const PREFIX: &str = "CLINICAGENDA_";

/// How read queries are retried against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn delay_before(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(2).min(16);
        self.backoff.saturating_mul(1 << doublings)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgendaConfig {
    pub owner_id: OwnerId,
    pub timezone: Tz,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub working_hours: WorkingHours,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            owner_id: Uuid::new_v4(),
            timezone: DEFAULT_TIMEZONE,
            poll_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            working_hours: WorkingHours::default(),
        }
    }
}

impl AgendaConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AgendaConfig::default();
        let var = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(raw) = var("OWNER_ID") {
            config.owner_id = Uuid::parse_str(&raw).map_err(|_| invalid("OWNER_ID", &raw))?;
        }
        if let Some(raw) = var("TIMEZONE") {
            config.timezone = raw.parse::<Tz>().map_err(|_| invalid("TIMEZONE", &raw))?;
        }
        if let Some(raw) = var("POLL_SECONDS") {
            let seconds: u64 = raw.parse().map_err(|_| invalid("POLL_SECONDS", &raw))?;
            if seconds == 0 {
                return Err(invalid("POLL_SECONDS", &raw));
            }
            config.poll_interval = Duration::from_secs(seconds);
        }
        if let Some(raw) = var("READ_RETRIES") {
            let attempts: u32 = raw.parse().map_err(|_| invalid("READ_RETRIES", &raw))?;
            config.retry.attempts = attempts.max(1);
        }
        if let Some(raw) = var("RETRY_BACKOFF_MS") {
            let millis: u64 = raw.parse().map_err(|_| invalid("RETRY_BACKOFF_MS", &raw))?;
            config.retry.backoff = Duration::from_millis(millis);
        }
        if let Some(raw) = var("WORK_START") {
            config.working_hours.start = parse_time(&raw).map_err(|_| invalid("WORK_START", &raw))?;
        }
        if let Some(raw) = var("WORK_END") {
            config.working_hours.end = parse_time(&raw).map_err(|_| invalid("WORK_END", &raw))?;
        }
        if let Some(raw) = var("BLOCK") {
            config.working_hours.block = parse_block(&raw).map_err(|_| invalid("BLOCK", &raw))?;
        }
        if let Some(raw) = var("SESSION_MINUTES") {
            let minutes: u32 = raw.parse().map_err(|_| invalid("SESSION_MINUTES", &raw))?;
            config.working_hours.activate_duration(minutes);
        }

        Ok(config)
    }
}

fn parse_block(raw: &str) -> Result<Option<(chrono::NaiveTime, chrono::NaiveTime)>> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| AgendaError::MalformedTime(raw.to_string()))?;
    Ok(Some((parse_time(start)?, parse_time(end)?)))
}

fn invalid(name: &str, raw: &str) -> AgendaError {
    AgendaError::validation(format!("Invalid value for {PREFIX}{name}: '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AgendaConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.working_hours, WorkingHours::default());
    }

    #[test]
    fn reads_overrides() {
        let owner = Uuid::new_v4().to_string();
        let config = AgendaConfig::from_lookup(lookup(&[
            ("OWNER_ID", owner.as_str()),
            ("TIMEZONE", "America/Manaus"),
            ("POLL_SECONDS", "30"),
            ("READ_RETRIES", "5"),
            ("WORK_START", "07:30"),
            ("BLOCK", "none"),
            ("SESSION_MINUTES", "40"),
        ]))
        .unwrap();

        assert_eq!(config.owner_id.to_string(), owner);
        assert_eq!(config.timezone, chrono_tz::America::Manaus);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.working_hours.start, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(config.working_hours.block, None);
        assert_eq!(config.working_hours.session_minutes(), Some(40));
    }

    #[test]
    fn parses_block_interval() {
        let config = AgendaConfig::from_lookup(lookup(&[("BLOCK", "11:30-13:00")])).unwrap();
        assert_eq!(
            config.working_hours.block,
            Some((NaiveTime::from_hms_opt(11, 30, 0).unwrap(), NaiveTime::from_hms_opt(13, 0, 0).unwrap()))
        );
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = AgendaConfig::from_lookup(lookup(&[("TIMEZONE", "Mars/Base")])).unwrap_err();
        assert!(err.to_string().contains("CLINICAGENDA_TIMEZONE"));
        assert!(AgendaConfig::from_lookup(lookup(&[("POLL_SECONDS", "0")])).is_err());
        assert!(AgendaConfig::from_lookup(lookup(&[("BLOCK", "noon")])).is_err());
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            attempts: 4,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    }
}
