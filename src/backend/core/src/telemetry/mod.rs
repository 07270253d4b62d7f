//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: `tracing` subscriber with JSON/pretty/compact output
//! - **Metrics**: Prometheus recorder plus static recorders for jobs,
//!   agents and HTTP requests
//!
//! # Example
//!
//! ```rust,no_run
//! use steward_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let handle = init_telemetry(&TelemetryConfig::default()).expect("telemetry");
//! let _text = handle.metrics.render();
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEvent};
pub use metrics::{
    init_metrics, AgentMetricsRecorder, HttpMetrics, MetricsConfig, MetricsRegistry,
    SchedulerMetrics,
};

use crate::config::ObservabilityConfig;

/// Service name attached to logs, metrics and health reports.
pub const SERVICE_NAME: &str = "steward-core";

/// Logging and metrics configuration for one service.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            environment: "development".to_string(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl From<&ObservabilityConfig> for TelemetryConfig {
    fn from(config: &ObservabilityConfig) -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            environment: config.environment.clone(),
            logging: config.logging.clone(),
            metrics: config.metrics.clone(),
        }
    }
}

/// Handle kept alive for the process lifetime.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
}

/// Initialize metrics, then logging. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    let metrics = init_metrics(&config.metrics, &config.service_name)?;
    init_logging(&config.logging, &config.environment)?;
    Ok(TelemetryHandle { metrics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_observability_config() {
        let observability = ObservabilityConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        let config = TelemetryConfig::from(&observability);
        assert_eq!(config.service_name, SERVICE_NAME);
        assert_eq!(config.environment, "production");
    }
}
