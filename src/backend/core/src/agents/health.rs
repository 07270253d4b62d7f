//! Health and execution metrics snapshots for a single agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::AgentState;
use crate::health::HealthStatus;

/// Percentage at or above which an agent counts as healthy.
pub const HEALTHY_THRESHOLD: f64 = 80.0;
/// Percentage at or above which an agent counts as degraded rather than unhealthy.
pub const DEGRADED_THRESHOLD: f64 = 50.0;

// ═══════════════════════════════════════════════════════════════════════════════
// Issues
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity of a health issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Slow or degraded behaviour
    Low,
    Medium,
    /// Partial failure
    High,
    /// Component down
    Critical,
}

impl IssueSeverity {
    /// Contribution of an unresolved issue to the agent's health percentage.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low | Self::Medium => 0.7,
            Self::High => 0.3,
            Self::Critical => 0.0,
        }
    }
}

/// A problem reported by an agent's self-check or lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthIssue {
    pub severity: IssueSeverity,
    pub message: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

impl HealthIssue {
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            code: code.into(),
            timestamp,
            resolved: false,
        }
    }

    pub fn resolved(mut self) -> Self {
        self.resolved = true;
        self
    }
}

/// Resource usage reported by an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub response_time_ms: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Point-in-time health of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub status: HealthStatus,
    pub health_percentage: f64,
    pub uptime_secs: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub issues: Vec<HealthIssue>,
    pub performance: PerformanceSnapshot,
}

impl Default for AgentHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            health_percentage: 0.0,
            uptime_secs: 0,
            last_check: None,
            issues: Vec::new(),
            performance: PerformanceSnapshot::default(),
        }
    }
}

/// Weighted health percentage over the agent's own state plus every
/// unresolved issue.
pub fn health_percentage(state: AgentState, issues: &[HealthIssue]) -> f64 {
    let mut total = state.health_weight();
    let mut count = 1usize;

    for issue in issues.iter().filter(|i| !i.resolved) {
        total += issue.severity.weight();
        count += 1;
    }

    (total / count as f64 * 100.0).clamp(0.0, 100.0)
}

/// Map a health percentage onto the shared health status scale.
pub fn status_for_percentage(percentage: f64) -> HealthStatus {
    if percentage >= HEALTHY_THRESHOLD {
        HealthStatus::Healthy
    } else if percentage >= DEGRADED_THRESHOLD {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execution Metrics
// ═══════════════════════════════════════════════════════════════════════════════

/// Execution counters for an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub average_execution_time_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
    #[serde(default)]
    pub custom: HashMap<String, f64>,
}

impl AgentMetrics {
    /// Fold one execution into the counters and the running average.
    pub fn record(&mut self, duration: Duration, success: bool, at: DateTime<Utc>) {
        let elapsed_ms = duration.as_secs_f64() * 1000.0;
        let previous = self.total_executions as f64;

        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }
        self.average_execution_time_ms =
            (self.average_execution_time_ms * previous + elapsed_ms) / self.total_executions as f64;
        self.last_execution = Some(at);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            1.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }

    pub fn increment_custom(&mut self, name: impl Into<String>, by: f64) {
        *self.custom.entry(name.into()).or_insert(0.0) += by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: IssueSeverity) -> HealthIssue {
        HealthIssue::new(severity, "TEST", "test issue", Utc::now())
    }

    #[test]
    fn test_running_without_issues_is_full_health() {
        assert_eq!(health_percentage(AgentState::Running, &[]), 100.0);
        assert_eq!(health_percentage(AgentState::Stopped, &[]), 0.0);
    }

    #[test]
    fn test_issue_weights_are_proportional() {
        // (1.0 + 0.7 + 0.3 + 0.0) / 4
        let issues = vec![
            issue(IssueSeverity::Low),
            issue(IssueSeverity::High),
            issue(IssueSeverity::Critical),
        ];
        let pct = health_percentage(AgentState::Running, &issues);
        assert!((pct - 50.0).abs() < 1e-9);
        assert_eq!(status_for_percentage(pct), HealthStatus::Degraded);
    }

    #[test]
    fn test_resolved_issues_ignored() {
        let issues = vec![issue(IssueSeverity::Critical).resolved()];
        assert_eq!(health_percentage(AgentState::Running, &issues), 100.0);
    }

    #[test]
    fn test_metrics_running_average() {
        let mut metrics = AgentMetrics::default();
        let now = Utc::now();
        metrics.record(Duration::from_millis(100), true, now);
        metrics.record(Duration::from_millis(300), false, now);

        assert_eq!(metrics.total_executions, 2);
        assert_eq!(metrics.successful_executions, 1);
        assert_eq!(metrics.failed_executions, 1);
        assert!((metrics.average_execution_time_ms - 200.0).abs() < 1e-6);
        assert_eq!(metrics.last_execution, Some(now));
        assert_eq!(metrics.success_rate(), 0.5);
    }
}
