//! Health checkers for the agent registry and the scheduler.

use async_trait::async_trait;
use std::sync::Arc;

use super::check::ComponentHealth;
use crate::agents::{AgentRegistry, SystemHealthStatus};
use crate::jobs::Scheduler;

/// A component that can report its own health.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ComponentHealth;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Agents
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps the registry's system health onto a component status: any agent in
/// Error is unhealthy, any agent not running is degraded.
pub struct AgentsHealthChecker {
    registry: Arc<AgentRegistry>,
}

impl AgentsHealthChecker {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HealthChecker for AgentsHealthChecker {
    fn name(&self) -> &str {
        "agents"
    }

    async fn check(&self) -> ComponentHealth {
        let system = self.registry.system_health();

        let health = ComponentHealth::new(self.name())
            .detail("systemStatus", system.status)
            .detail("totalAgents", system.total_agents)
            .detail("runningAgents", system.running_agents)
            .detail("errorAgents", system.error_agents);

        match system.status {
            SystemHealthStatus::Healthy => health,
            SystemHealthStatus::Warning => health.degrade(format!(
                "{} of {} agents not running",
                system.total_agents - system.running_agents,
                system.total_agents
            )),
            SystemHealthStatus::Critical => {
                let failed: Vec<&str> = system
                    .agents
                    .iter()
                    .filter(|a| a.state.is_error())
                    .map(|a| a.id.as_str())
                    .collect();
                health.fail(format!("Agents in error: {}", failed.join(", ")))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════════

/// Reports the scheduler degraded when it is stopped or when execution
/// slot utilization crosses the threshold.
pub struct SchedulerHealthChecker {
    scheduler: Arc<Scheduler>,
    saturation_threshold_pct: f64,
}

impl SchedulerHealthChecker {
    pub fn new(scheduler: Arc<Scheduler>, saturation_threshold_pct: f64) -> Self {
        Self {
            scheduler,
            saturation_threshold_pct,
        }
    }
}

#[async_trait]
impl HealthChecker for SchedulerHealthChecker {
    fn name(&self) -> &str {
        "scheduler"
    }

    async fn check(&self) -> ComponentHealth {
        let status = self.scheduler.status();
        let utilization =
            status.running_jobs as f64 / status.config.max_concurrent.max(1) as f64 * 100.0;

        let health = ComponentHealth::new(self.name())
            .detail("running", status.running)
            .detail("runningJobs", status.running_jobs)
            .detail("pendingJobs", status.pending_jobs)
            .detail("maxConcurrent", status.config.max_concurrent)
            .detail("utilizationPct", utilization)
            .detail("jobsFailed", status.stats.failed)
            .detail("jobsCompleted", status.stats.completed);

        if !status.running {
            health.degrade("Scheduler is stopped")
        } else if utilization >= self.saturation_threshold_pct {
            health.degrade(format!(
                "Execution slots saturated: {:.1}% (threshold: {:.1}%)",
                utilization, self.saturation_threshold_pct
            ))
        } else {
            health
        }
    }
}
