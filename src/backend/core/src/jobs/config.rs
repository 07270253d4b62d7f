//! Runtime schedule configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{duration_ms, option_duration_ms};
use crate::error::{Result, StewardError};

/// Process-wide scheduling knobs, adjustable while running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// When false the polling pass does nothing.
    pub enabled: bool,
    #[serde(rename = "pollIntervalMs", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Advisory label; times are always handled in UTC.
    pub timezone: String,
    /// Cap on jobs in the Running state, across all agents.
    pub max_concurrent: usize,
    #[serde(rename = "retryBaseDelayMs", with = "duration_ms")]
    pub retry_base_delay: Duration,
    /// Per-attempt timeout. `None` lets task bodies run unbounded.
    #[serde(rename = "jobTimeoutMs", with = "option_duration_ms")]
    pub job_timeout: Option<Duration>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(5),
            timezone: "UTC".to_string(),
            max_concurrent: 5,
            retry_base_delay: Duration::from_secs(30),
            job_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(StewardError::invalid_configuration(
                "pollIntervalMs",
                "must be greater than zero",
            ));
        }
        if self.max_concurrent == 0 {
            return Err(StewardError::invalid_configuration(
                "maxConcurrent",
                "must be at least 1",
            ));
        }
        if self.timezone.trim().is_empty() {
            return Err(StewardError::invalid_configuration(
                "timezone",
                "must not be empty",
            ));
        }
        Ok(())
    }

    /// Shallow-merge a patch and validate the result.
    pub fn merged(&self, patch: &ScheduleConfigPatch) -> Result<ScheduleConfig> {
        let mut next = self.clone();

        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        if let Some(ms) = patch.poll_interval_ms {
            next.poll_interval = millis("pollIntervalMs", ms, false)?;
        }
        if let Some(timezone) = &patch.timezone {
            next.timezone = timezone.clone();
        }
        if let Some(max) = patch.max_concurrent {
            next.max_concurrent = usize::try_from(max).map_err(|_| {
                StewardError::invalid_configuration("maxConcurrent", "must be at least 1")
            })?;
        }
        if let Some(ms) = patch.retry_base_delay_ms {
            next.retry_base_delay = millis("retryBaseDelayMs", ms, true)?;
        }
        if let Some(ms) = patch.job_timeout_ms {
            next.job_timeout = match millis("jobTimeoutMs", ms, true)? {
                d if d.is_zero() => None,
                d => Some(d),
            };
        }

        next.validate()?;
        Ok(next)
    }
}

fn millis(field: &str, ms: i64, allow_zero: bool) -> Result<Duration> {
    if ms < 0 || (ms == 0 && !allow_zero) {
        let rule = if allow_zero {
            "must not be negative"
        } else {
            "must be greater than zero"
        };
        return Err(StewardError::invalid_configuration(field, rule));
    }
    Ok(Duration::from_millis(ms as u64))
}

/// Partial schedule configuration. `jobTimeoutMs: 0` disables the timeout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_base_delay_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_timeout_ms: Option<i64>,
}
