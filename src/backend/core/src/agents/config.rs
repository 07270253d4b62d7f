//! Per-agent configuration and partial updates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_ms;
use crate::error::{Result, StewardError};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ═══════════════════════════════════════════════════════════════════════════════
// Retry Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry behaviour for jobs bound to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts a job gets before it is failed for good.
    pub max_attempts: u32,
    /// Advisory growth factor reported to clients; retries back off linearly.
    pub backoff_multiplier: f64,
    /// Upper bound on the delay before any retry.
    #[serde(rename = "maxDelayMs", with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(3600),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Agent Config
// ═══════════════════════════════════════════════════════════════════════════════

/// Mutable configuration of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub enabled: bool,
    /// How often the recurring driver enqueues a background job.
    #[serde(rename = "scheduleIntervalMs", with = "duration_ms")]
    pub schedule_interval: Duration,
    pub retry_policy: RetryPolicy,
    pub log_level: String,
    #[serde(default)]
    pub notification_channels: Vec<String>,
    #[serde(default)]
    pub custom_settings: serde_json::Map<String, serde_json::Value>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule_interval: Duration::from_secs(300),
            retry_policy: RetryPolicy::default(),
            log_level: "info".to_string(),
            notification_channels: Vec::new(),
            custom_settings: serde_json::Map::new(),
        }
    }
}

impl AgentConfig {
    pub fn with_schedule_interval(mut self, interval: Duration) -> Self {
        self.schedule_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_policy.max_attempts = attempts;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.schedule_interval.is_zero() {
            return Err(StewardError::invalid_configuration(
                "scheduleIntervalMs",
                "must be greater than zero",
            ));
        }
        if self.retry_policy.max_delay.is_zero() {
            return Err(StewardError::invalid_configuration(
                "retryPolicy.maxDelayMs",
                "must be greater than zero",
            ));
        }
        let multiplier = self.retry_policy.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(StewardError::invalid_configuration(
                "retryPolicy.backoffMultiplier",
                "must be a finite number >= 1",
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(StewardError::invalid_configuration(
                "logLevel",
                format!("must be one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        Ok(())
    }

    /// Shallow-merge a patch, returning the new config without touching `self`.
    pub fn merged(&self, patch: &AgentConfigPatch) -> Result<AgentConfig> {
        let mut next = self.clone();

        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        if let Some(ms) = patch.schedule_interval_ms {
            next.schedule_interval = positive_millis("scheduleIntervalMs", ms)?;
        }
        if let Some(retry) = &patch.retry_policy {
            if let Some(attempts) = retry.max_attempts {
                next.retry_policy.max_attempts = u32::try_from(attempts).map_err(|_| {
                    StewardError::invalid_configuration(
                        "retryPolicy.maxAttempts",
                        "must be a non-negative integer",
                    )
                })?;
            }
            if let Some(multiplier) = retry.backoff_multiplier {
                next.retry_policy.backoff_multiplier = multiplier;
            }
            if let Some(ms) = retry.max_delay_ms {
                next.retry_policy.max_delay = positive_millis("retryPolicy.maxDelayMs", ms)?;
            }
        }
        if let Some(level) = &patch.log_level {
            next.log_level = level.to_ascii_lowercase();
        }
        if let Some(channels) = &patch.notification_channels {
            next.notification_channels = channels.clone();
        }
        if let Some(settings) = &patch.custom_settings {
            next.custom_settings = settings.clone();
        }

        next.validate()?;
        Ok(next)
    }

    /// Whether moving to `next` affects the recurring schedule.
    pub fn schedule_changed(&self, next: &AgentConfig) -> bool {
        self.enabled != next.enabled || self.schedule_interval != next.schedule_interval
    }
}

fn positive_millis(field: &str, ms: i64) -> Result<Duration> {
    if ms <= 0 {
        return Err(StewardError::invalid_configuration(
            field,
            "must be greater than zero",
        ));
    }
    Ok(Duration::from_millis(ms as u64))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Partial Updates
// ═══════════════════════════════════════════════════════════════════════════════

/// Partial agent configuration. Absent fields keep their current value.
///
/// Numbers are signed so that negative input reaches validation instead of
/// failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AgentConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_interval_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicyPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_settings: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetryPolicyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_merge_is_shallow() {
        let base = AgentConfig::default();
        let patch = AgentConfigPatch {
            schedule_interval_ms: Some(60_000),
            notification_channels: Some(vec!["email".into()]),
            ..Default::default()
        };

        let next = base.merged(&patch).unwrap();
        assert_eq!(next.schedule_interval, Duration::from_secs(60));
        assert_eq!(next.notification_channels, vec!["email".to_string()]);
        assert_eq!(next.retry_policy, base.retry_policy);
        assert!(next.enabled);
        assert!(base.schedule_changed(&next));
    }

    #[test]
    fn test_negative_interval_rejected() {
        let patch = AgentConfigPatch {
            schedule_interval_ms: Some(-5),
            ..Default::default()
        };
        let err = AgentConfig::default().merged(&patch).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let patch = AgentConfigPatch {
            log_level: Some("verbose".into()),
            ..Default::default()
        };
        assert!(AgentConfig::default().merged(&patch).is_err());
    }

    #[test]
    fn test_patch_deserializes_camel_case() {
        let patch: AgentConfigPatch = serde_json::from_value(serde_json::json!({
            "enabled": false,
            "retryPolicy": { "maxAttempts": 5 }
        }))
        .unwrap();

        let next = AgentConfig::default().merged(&patch).unwrap();
        assert!(!next.enabled);
        assert_eq!(next.retry_policy.max_attempts, 5);
    }

    #[test]
    fn test_patch_rejects_unknown_keys() {
        assert!(serde_json::from_value::<AgentConfigPatch>(serde_json::json!({
            "maxConcurrent": 2
        }))
        .is_err());
        assert!(serde_json::from_value::<AgentConfigPatch>(serde_json::json!({
            "retryPolicy": { "maxAttempt": 2 }
        }))
        .is_err());
    }

    #[test]
    fn test_config_serializes_millis() {
        let json = serde_json::to_value(AgentConfig::default()).unwrap();
        assert_eq!(json["scheduleIntervalMs"], 300_000);
        assert_eq!(json["retryPolicy"]["maxDelayMs"], 3_600_000);
    }
}
