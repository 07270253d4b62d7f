//! Scheduler facade: polling loop, recurring timers and gated agent control.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use super::config::{ScheduleConfig, ScheduleConfigPatch};
use super::executor::{ExecutorStatsSnapshot, JobExecutor, PollSummary};
use super::job::{Job, JobId, JobKind};
use super::recurring::RecurringDriver;
use crate::agents::{Agent, AgentConfigPatch, AgentRegistry, ConfigChange, RestartReport};
use crate::auth::{ensure_authorized, CallSource, ControlOperation};
use crate::context::CoreContext;
use crate::error::Result;
use crate::ticker::Ticker;

/// Scheduler snapshot served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    /// Agents currently in the Running state
    pub active_agents: usize,
    pub total_agents: usize,
    pub running_jobs: usize,
    pub pending_jobs: usize,
    pub total_jobs: usize,
    pub recurring_timers: usize,
    pub config: ScheduleConfig,
    pub stats: ExecutorStatsSnapshot,
}

/// Owns the executor, the polling ticker and the recurring driver.
///
/// Stopping the scheduler only cancels its tickers. Jobs already running
/// finish on their own and Pending jobs wait for the next start.
pub struct Scheduler {
    executor: Arc<JobExecutor>,
    recurring: RecurringDriver,
    poller: Mutex<Option<Ticker>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .field("executor", &self.executor)
            .finish()
    }
}

impl Scheduler {
    pub fn new(ctx: CoreContext, config: ScheduleConfig) -> Result<Self> {
        let executor = Arc::new(JobExecutor::new(ctx, config)?);
        let recurring = RecurringDriver::new(executor.clone());
        Ok(Self {
            executor,
            recurring,
            poller: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &CoreContext {
        self.executor.context()
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.executor.context().registry
    }

    pub fn executor(&self) -> &Arc<JobExecutor> {
        &self.executor
    }

    pub fn recurring(&self) -> &RecurringDriver {
        &self.recurring
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Run Control
    // ─────────────────────────────────────────────────────────────────────────

    /// Start polling and the recurring timers. Returns false if already
    /// running.
    pub fn start(&self) -> bool {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return false;
        }

        let interval = self.executor.config().poll_interval;
        *poller = Some(self.spawn_poller(interval));
        drop(poller);

        self.recurring.start_all();
        info!(poll_interval_ms = interval.as_millis() as u64, "Scheduler started");
        true
    }

    /// Cancel polling and the recurring timers. Returns false if not running.
    pub fn stop(&self) -> bool {
        let Some(poller) = self.poller.lock().take() else {
            return false;
        };
        poller.stop();
        self.recurring.stop_all();
        info!("Scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.poller.lock().is_some()
    }

    /// Run one polling pass now, outside the ticker.
    pub fn poll_now(&self) -> PollSummary {
        self.executor.poll_due_jobs()
    }

    fn spawn_poller(&self, interval: Duration) -> Ticker {
        let executor = self.executor.clone();
        Ticker::spawn("scheduler-poll", interval, move || {
            let executor = executor.clone();
            async move {
                executor.poll_due_jobs();
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> ScheduleConfig {
        self.executor.config()
    }

    /// Merge a schedule config patch. A changed poll interval restarts the
    /// polling ticker when the scheduler is running.
    pub fn update_config(&self, patch: &ScheduleConfigPatch) -> Result<ScheduleConfig> {
        let previous = self.executor.config().poll_interval;
        let next = self.executor.update_config(patch)?;

        if next.poll_interval != previous {
            let mut poller = self.poller.lock();
            if let Some(old) = poller.take() {
                old.stop();
                *poller = Some(self.spawn_poller(next.poll_interval));
            }
        }
        Ok(next)
    }

    pub fn status(&self) -> SchedulerStatus {
        let registry = self.registry();
        let counts = self.context().jobs.counts();
        SchedulerStatus {
            running: self.is_running(),
            active_agents: registry
                .list()
                .iter()
                .filter(|agent| agent.state().is_running())
                .count(),
            total_agents: registry.len(),
            running_jobs: counts.running,
            pending_jobs: counts.pending,
            total_jobs: counts.total,
            recurring_timers: self.recurring.active_timers(),
            config: self.config(),
            stats: self.executor.stats(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent Control
    // ─────────────────────────────────────────────────────────────────────────

    pub fn register_agent(&self, agent: Agent) -> Result<Arc<Agent>> {
        self.registry().register(agent)
    }

    #[instrument(skip(self, patch), fields(agent_id = %agent_id, source = %source))]
    pub async fn configure_agent(
        &self,
        agent_id: &str,
        patch: &AgentConfigPatch,
        source: CallSource,
    ) -> Result<ConfigChange> {
        ensure_authorized(agent_id, ControlOperation::Configure, source)?;
        self.registry().configure(agent_id, patch).await
    }

    pub async fn start_agent(&self, agent_id: &str, source: CallSource) -> Result<()> {
        ensure_authorized(agent_id, ControlOperation::Start, source)?;
        self.registry().start(agent_id).await
    }

    pub async fn stop_agent(&self, agent_id: &str, source: CallSource) -> Result<()> {
        ensure_authorized(agent_id, ControlOperation::Stop, source)?;
        self.registry().stop(agent_id).await
    }

    /// Restart needs both stop and start rights.
    pub async fn restart_agent(&self, agent_id: &str, source: CallSource) -> Result<RestartReport> {
        ensure_authorized(agent_id, ControlOperation::Stop, source)?;
        ensure_authorized(agent_id, ControlOperation::Start, source)?;
        self.registry().restart(agent_id).await
    }

    pub async fn unregister_agent(&self, agent_id: &str, source: CallSource) -> Result<()> {
        ensure_authorized(agent_id, ControlOperation::Remove, source)?;
        self.registry().unregister(agent_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Jobs
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn schedule_job(
        &self,
        agent_id: &str,
        kind: JobKind,
        delay: Duration,
        source: CallSource,
    ) -> Result<Job> {
        self.executor.schedule_job(agent_id, kind, delay, source).await
    }

    pub fn job(&self, job_id: &JobId) -> Result<Job> {
        self.executor.job(job_id)
    }

    pub fn jobs_for_agent(&self, agent_id: &str) -> Vec<Job> {
        self.executor.jobs_for_agent(agent_id)
    }

    pub fn cleanup_old_jobs(&self, max_age: Duration) -> usize {
        self.executor.cleanup_old_jobs(max_age)
    }

    /// Stop the tickers and wait for in-flight executions.
    pub async fn shutdown(&self) {
        self.stop();
        self.executor.join_in_flight().await;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDescriptor, FnAgent};
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;

    fn scheduler() -> Scheduler {
        let ctx = CoreContext::new(Arc::new(ManualClock::starting_now()));
        Scheduler::new(ctx, ScheduleConfig::default()).unwrap()
    }

    fn agent(scheduler: &Scheduler, id: &str) -> Agent {
        Agent::new(
            AgentDescriptor::new(id, id),
            Arc::new(FnAgent::succeeding()),
            scheduler.context().clock.clone(),
        )
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let scheduler = scheduler();
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.status().running);

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_tenant_cannot_control_protected_agent() {
        let scheduler = scheduler();
        scheduler
            .register_agent(agent(&scheduler, "leads-agent"))
            .unwrap();

        let err = scheduler
            .stop_agent("leads-agent", CallSource::Tenant)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AgentProtected);

        let err = scheduler
            .unregister_agent("leads-agent", CallSource::Tenant)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AgentProtected);
        assert!(scheduler.registry().contains("leads-agent"));

        scheduler
            .start_agent("leads-agent", CallSource::System)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_change_restarts_poller() {
        let scheduler = scheduler();
        scheduler.start();

        let patch = ScheduleConfigPatch {
            poll_interval_ms: Some(1000),
            ..Default::default()
        };
        let next = scheduler.update_config(&patch).unwrap();
        assert_eq!(next.poll_interval, Duration::from_secs(1));
        assert!(scheduler.is_running());

        scheduler
            .register_agent(agent(&scheduler, "w1"))
            .unwrap();
        scheduler
            .schedule_job("w1", JobKind::Scheduled, Duration::ZERO, CallSource::Tenant)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.executor().join_in_flight().await;
        assert_eq!(scheduler.status().stats.completed, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_changes_nothing() {
        let scheduler = scheduler();
        let before = scheduler.config();
        let patch = ScheduleConfigPatch {
            max_concurrent: Some(0),
            ..Default::default()
        };
        assert!(scheduler.update_config(&patch).is_err());
        assert_eq!(scheduler.config(), before);
    }
}
