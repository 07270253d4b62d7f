//! Prometheus metrics for jobs, agents and HTTP requests.
//!
//! Call sites use the static recorders below ([`SchedulerMetrics`],
//! [`AgentMetricsRecorder`], [`HttpMetrics`]); they are no-ops until
//! [`init_metrics`] installs the global recorder.
//!
//! ```rust,no_run
//! use steward_core::telemetry::{init_metrics, MetricsConfig};
//!
//! let registry = init_metrics(&MetricsConfig::default(), "steward-core")?;
//! println!("{}", registry.render());
//! # Ok::<(), anyhow::Error>(())
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::jobs::JobKind;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Labels added to every metric
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle to the Prometheus exporter, if one is installed.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// Registry that renders nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self {
            prometheus_handle: Some(handle),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Fails on invalid buckets or when a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");
    Ok(MetricsRegistry::from_handle(handle))
}

fn register_metric_descriptions() {
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!("http_requests_total", "Total number of HTTP requests");

    describe_counter!("steward_errors_total", "Errors raised, by code and severity");

    describe_counter!("steward_jobs_scheduled_total", "Jobs created, by kind");
    describe_counter!(
        "steward_jobs_completed_total",
        "Jobs that completed successfully"
    );
    describe_counter!(
        "steward_jobs_failed_total",
        "Jobs failed for good, by reason"
    );
    describe_counter!(
        "steward_jobs_retried_total",
        "Faulted attempts sent back for retry"
    );
    describe_counter!("steward_jobs_cleaned_total", "Terminal jobs purged");
    describe_gauge!("steward_jobs_running", "Execution slots currently held");
    describe_histogram!(
        "steward_job_duration_seconds",
        "Task body execution time in seconds"
    );

    describe_counter!(
        "steward_agent_transitions_total",
        "Agent lifecycle state changes, by target state"
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// Recorders
// ═══════════════════════════════════════════════════════════════════════════════

/// Job pipeline metrics.
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    pub fn record_job_scheduled(kind: JobKind) {
        counter!("steward_jobs_scheduled_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_job_completed(agent_id: &str, duration: Duration) {
        counter!("steward_jobs_completed_total", "agent_id" => agent_id.to_string()).increment(1);
        histogram!("steward_job_duration_seconds", "agent_id" => agent_id.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_job_failed(agent_id: &str, reason: &'static str) {
        counter!(
            "steward_jobs_failed_total",
            "agent_id" => agent_id.to_string(),
            "reason" => reason,
        )
        .increment(1);
    }

    pub fn record_job_retried(agent_id: &str) {
        counter!("steward_jobs_retried_total", "agent_id" => agent_id.to_string()).increment(1);
    }

    pub fn record_jobs_cleaned(count: usize) {
        counter!("steward_jobs_cleaned_total").increment(count as u64);
    }

    pub fn set_running_jobs(count: usize) {
        gauge!("steward_jobs_running").set(count as f64);
    }
}

/// Agent lifecycle metrics.
pub struct AgentMetricsRecorder;

impl AgentMetricsRecorder {
    pub fn record_transition(agent_id: &str, to: &'static str) {
        counter!(
            "steward_agent_transitions_total",
            "agent_id" => agent_id.to_string(),
            "state" => to,
        )
        .increment(1);
    }
}

/// HTTP request metrics.
pub struct HttpMetrics;

impl HttpMetrics {
    pub fn record(method: &str, path: &str, status_code: u16, duration: Duration) {
        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status_code", status_code.to_string()),
        ];
        histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
        counter!("http_requests_total", &labels).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let registry = init_metrics(
            &MetricsConfig {
                enabled: false,
                ..Default::default()
            },
            "test",
        )
        .unwrap();
        assert!(!registry.is_enabled());
        assert_eq!(registry.render(), "");
    }

    #[test]
    fn test_recorders_are_noops_without_exporter() {
        SchedulerMetrics::record_job_scheduled(JobKind::Immediate);
        SchedulerMetrics::record_job_completed("w1", Duration::from_millis(5));
        SchedulerMetrics::set_running_jobs(0);
        HttpMetrics::record("GET", "/health", 200, Duration::from_millis(1));
    }

    #[test]
    fn test_local_recorder_renders_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            SchedulerMetrics::record_job_scheduled(JobKind::Scheduled);
        });

        let rendered = MetricsRegistry::from_handle(handle).render();
        assert!(rendered.contains("steward_jobs_scheduled_total"));
        assert!(rendered.contains("kind=\"scheduled\""));
    }
}
