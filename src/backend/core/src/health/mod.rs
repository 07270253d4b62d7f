//! Health checking: component checkers, aggregated reports and the
//! liveness/readiness probes.

mod check;
mod checker;
mod routes;

pub use check::*;
pub use checker::*;
pub use routes::*;

use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// `health` section of the server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Per-checker timeout
    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub check_timeout: Duration,

    /// Slot utilization at which the scheduler reports degraded
    #[serde(default = "default_saturation_pct")]
    pub saturation_threshold_pct: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout: default_check_timeout(),
            saturation_threshold_pct: default_saturation_pct(),
        }
    }
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_saturation_pct() -> f64 {
    100.0
}

/// Runs every registered checker and aggregates the results.
pub struct HealthService {
    check_timeout: Duration,
    checkers: Vec<Arc<dyn HealthChecker>>,
    started_at: Instant,
}

impl HealthService {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            check_timeout: config.check_timeout,
            checkers: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn HealthChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Run all checks concurrently. A checker that overruns the timeout is
    /// reported unhealthy.
    pub async fn check_health(&self) -> HealthReport {
        let components = join_all(self.checkers.iter().map(|checker| async move {
            let start = Instant::now();
            let mut health = match tokio::time::timeout(self.check_timeout, checker.check()).await {
                Ok(health) => health,
                Err(_) => ComponentHealth::new(checker.name()).fail("Health check timed out"),
            };
            health.latency_ms = Some(start.elapsed().as_millis() as u64);
            health
        }))
        .await;

        HealthReport::from_components(components, self.started_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl HealthChecker for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> ComponentHealth {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ComponentHealth::new("slow")
        }
    }

    struct Fine;

    #[async_trait]
    impl HealthChecker for Fine {
        fn name(&self) -> &str {
            "fine"
        }

        async fn check(&self) -> ComponentHealth {
            ComponentHealth::new("fine")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_checker_is_unhealthy() {
        let service = HealthService::new(&HealthConfig::default())
            .with_checker(Arc::new(Fine))
            .with_checker(Arc::new(Slow));

        let report = service.check_health().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.component("fine").unwrap().status, HealthStatus::Healthy);

        let slow = report.component("slow").unwrap();
        assert_eq!(slow.message.as_deref(), Some("Health check timed out"));
        assert_eq!(slow.latency_ms, Some(5_000));
    }

    #[test]
    fn test_config_accepts_humantime() {
        let config: HealthConfig =
            serde_json::from_value(serde_json::json!({ "check_timeout": "250ms" })).unwrap();
        assert_eq!(config.check_timeout, Duration::from_millis(250));
        assert_eq!(config.saturation_threshold_pct, 100.0);
    }
}
