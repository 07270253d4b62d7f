//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

use crate::health::HealthConfig;
use crate::jobs::ScheduleConfig;
use crate::telemetry::{LoggingConfig, MetricsConfig};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Health check configuration
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Deployment environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Process-level scheduler settings. Durations accept humantime strings
/// such as `"5s"` or `"24h"`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// Start the scheduler when the server boots
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Whether the polling pass does any work
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_retry_base_delay", with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Per-job timeout. Unset disables the timeout.
    #[serde(default = "default_job_timeout", with = "humantime_serde")]
    pub job_timeout: Option<Duration>,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How often agents run their self-check while running
    #[serde(default = "default_self_check_interval", with = "humantime_serde")]
    pub self_check_interval: Duration,

    /// Cadence of the built-in job janitor
    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Age after which the janitor purges terminal jobs
    #[serde(default = "default_cleanup_max_age", with = "humantime_serde")]
    pub cleanup_max_age: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            autostart: default_autostart(),
            enabled: default_enabled(),
            poll_interval: default_poll_interval(),
            max_concurrent: default_max_concurrent(),
            retry_base_delay: default_retry_base_delay(),
            job_timeout: default_job_timeout(),
            timezone: default_timezone(),
            self_check_interval: default_self_check_interval(),
            cleanup_interval: default_cleanup_interval(),
            cleanup_max_age: default_cleanup_max_age(),
        }
    }
}

impl SchedulerSettings {
    /// Initial runtime schedule configuration derived from these settings.
    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            enabled: self.enabled,
            poll_interval: self.poll_interval,
            timezone: self.timezone.clone(),
            max_concurrent: self.max_concurrent,
            retry_base_delay: self.retry_base_delay,
            job_timeout: self.job_timeout,
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_environment() -> String { "development".to_string() }
fn default_autostart() -> bool { true }
fn default_enabled() -> bool { true }
fn default_poll_interval() -> Duration { Duration::from_secs(5) }
fn default_max_concurrent() -> usize { 5 }
fn default_retry_base_delay() -> Duration { Duration::from_secs(30) }
fn default_job_timeout() -> Option<Duration> { Some(Duration::from_secs(300)) }
fn default_timezone() -> String { "UTC".to_string() }
fn default_self_check_interval() -> Duration { Duration::from_secs(60) }
fn default_cleanup_interval() -> Duration { Duration::from_secs(3600) }
fn default_cleanup_max_age() -> Duration { Duration::from_secs(24 * 3600) }

/// Names an optional config file (any format the `config` crate reads).
pub const CONFIG_FILE_ENV: &str = "STEWARD_CONFIG";

impl Config {
    /// Load configuration: the file named by `STEWARD_CONFIG` when set, then
    /// `STEWARD__SECTION__KEY` environment overrides on top.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(std::env::var(CONFIG_FILE_ENV).ok().as_deref())
    }

    pub fn load_from(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let cfg = builder
            .add_source(config::Environment::with_prefix("STEWARD").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(cfg)
    }
}

/// Serde adapter for a `Duration` expressed as whole milliseconds on the wire.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Like [`duration_ms`], for optional durations (`null` means unset).
pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::duration_ms::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
