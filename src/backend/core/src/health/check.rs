//! Health status types and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::telemetry::SERVICE_NAME;

/// Component or process health. Variants are ordered from best to worst.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// Serving, with stopped agents or saturated slots
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        *self != Self::Unhealthy
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(label)
    }
}

/// Result of checking one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl ComponentHealth {
    /// A healthy component; downgrade it with [`degrade`](Self::degrade) or [`fail`](Self::fail).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms: None,
            checked_at: Utc::now(),
            details: Map::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.to_string(), v);
        }
        self
    }

    /// Mark degraded unless something worse was already recorded.
    pub fn degrade(self, message: impl Into<String>) -> Self {
        self.downgrade(HealthStatus::Degraded, message.into())
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.downgrade(HealthStatus::Unhealthy, message.into())
    }

    fn downgrade(mut self, status: HealthStatus, message: String) -> Self {
        if status >= self.status {
            self.status = status;
            self.message = Some(message);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}

/// Aggregated health of every registered component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Worst component status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
    pub summary: HealthSummary,
}

impl HealthReport {
    pub fn from_components(components: Vec<ComponentHealth>, uptime: Duration) -> Self {
        let mut summary = HealthSummary {
            total: components.len(),
            ..Default::default()
        };
        for component in &components {
            match component.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Unhealthy => summary.unhealthy += 1,
            }
        }

        Self {
            status: components.iter().map(|c| c.status).max().unwrap_or_default(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_secs: uptime.as_secs(),
            components,
            summary,
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Probes
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl LivenessResponse {
    pub fn alive() -> Self {
        Self {
            alive: true,
            service: SERVICE_NAME.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unready_components: Vec<String>,
}

impl From<&HealthReport> for ReadinessResponse {
    fn from(report: &HealthReport) -> Self {
        let unready_components: Vec<String> = report
            .components
            .iter()
            .filter(|c| !c.status.is_operational())
            .map(|c| c.name.clone())
            .collect();
        let ready = unready_components.is_empty();

        Self {
            ready,
            service: report.service.clone(),
            timestamp: report.timestamp,
            reason: (!ready).then(|| "One or more components are unhealthy".to_string()),
            unready_components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_never_improves() {
        let component = ComponentHealth::new("agents").fail("w3 in error").degrade("w2 stopped");
        assert_eq!(component.status, HealthStatus::Unhealthy);
        assert_eq!(component.message.as_deref(), Some("w3 in error"));
    }

    #[test]
    fn test_report_takes_worst_status() {
        let report = HealthReport::from_components(
            vec![
                ComponentHealth::new("a"),
                ComponentHealth::new("b").degrade("slow"),
            ],
            Duration::from_secs(90),
        );

        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.status.is_operational());
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.degraded, 1);
        assert_eq!(report.uptime_secs, 90);
        assert!(report.component("b").is_some());
    }

    #[test]
    fn test_empty_report_is_healthy() {
        let report = HealthReport::from_components(Vec::new(), Duration::ZERO);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_readiness_lists_unhealthy_components() {
        let report = HealthReport::from_components(
            vec![
                ComponentHealth::new("scheduler"),
                ComponentHealth::new("agents").fail("w1 in error"),
            ],
            Duration::ZERO,
        );

        let readiness = ReadinessResponse::from(&report);
        assert!(!readiness.ready);
        assert_eq!(readiness.unready_components, vec!["agents".to_string()]);
    }
}
