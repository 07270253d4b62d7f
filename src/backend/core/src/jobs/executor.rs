//! Job execution: admission control, task invocation, retries.

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::config::{ScheduleConfig, ScheduleConfigPatch};
use super::job::{FaultOutcome, Job, JobId, JobKind};
use crate::auth::{ensure_authorized, CallSource, ControlOperation};
use crate::clock::add_duration;
use crate::context::CoreContext;
use crate::error::{Result, StewardError};
use crate::telemetry::SchedulerMetrics;

/// Error recorded on a job whose attempt exceeded the timeout.
pub const TIMEOUT_ERROR: &str = "timeout";
/// Error recorded on a job whose agent is gone.
pub const AGENT_NOT_FOUND_ERROR: &str = "agent not found";

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct ExecutorStats {
    scheduled: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time executor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStatsSnapshot {
    pub scheduled: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub timed_out: u64,
    /// Most slots ever held at once
    pub peak_running: usize,
}

/// Result of one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub due: usize,
    pub started: usize,
    /// Due jobs left Pending because every slot was taken.
    pub deferred: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Admission Control
// ═══════════════════════════════════════════════════════════════════════════════

/// Counter of execution slots in use.
///
/// The limit is read at acquisition time, so changing `max_concurrent`
/// applies from the next admission on.
#[derive(Debug, Default)]
struct ConcurrencyGate {
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGate {
    fn try_acquire(self: &Arc<Self>, limit: usize) -> Option<SlotGuard> {
        let mut current = self.in_use.load(Ordering::SeqCst);
        loop {
            if current >= limit {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(current + 1, Ordering::Relaxed);
                    SchedulerMetrics::set_running_jobs(current + 1);
                    return Some(SlotGuard { gate: self.clone() });
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }
}

/// One held execution slot. Released on drop.
struct SlotGuard {
    gate: Arc<ConcurrencyGate>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let previous = self.gate.in_use.fetch_sub(1, Ordering::SeqCst);
        SchedulerMetrics::set_running_jobs(previous.saturating_sub(1));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Executor
// ═══════════════════════════════════════════════════════════════════════════════

/// State a running execution needs, detached from the executor itself.
#[derive(Clone)]
struct ExecutionEnv {
    ctx: CoreContext,
    config: Arc<RwLock<ScheduleConfig>>,
    stats: Arc<ExecutorStats>,
}

/// Schedules jobs and runs due ones under the global concurrency cap.
pub struct JobExecutor {
    env: ExecutionEnv,
    gate: Arc<ConcurrencyGate>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("slots_in_use", &self.gate.in_use())
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl JobExecutor {
    /// Create an executor. Fails if `config` is invalid.
    pub fn new(ctx: CoreContext, config: ScheduleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            env: ExecutionEnv {
                ctx,
                config: Arc::new(RwLock::new(config)),
                stats: Arc::new(ExecutorStats::default()),
            },
            gate: Arc::new(ConcurrencyGate::default()),
            in_flight: Mutex::new(Vec::new()),
        })
    }

    pub fn context(&self) -> &CoreContext {
        &self.env.ctx
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> ScheduleConfig {
        self.env.config.read().clone()
    }

    /// Merge a patch into the schedule configuration. Invalid patches change
    /// nothing.
    pub fn update_config(&self, patch: &ScheduleConfigPatch) -> Result<ScheduleConfig> {
        let mut config = self.env.config.write();
        let next = config.merged(patch)?;
        *config = next.clone();
        info!(
            max_concurrent = next.max_concurrent,
            poll_interval_ms = next.poll_interval.as_millis() as u64,
            enabled = next.enabled,
            "Schedule configuration updated"
        );
        Ok(next)
    }

    /// Replace the schedule configuration wholesale.
    pub fn replace_config(&self, config: ScheduleConfig) -> Result<()> {
        config.validate()?;
        *self.env.config.write() = config;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a job for `agent_id`.
    ///
    /// The authorization gate is consulted before anything else; a rejected
    /// request leaves no trace. `Immediate` jobs ignore `delay` and run
    /// before this returns when a slot is free, otherwise they wait for the
    /// next polling pass.
    #[instrument(skip(self), fields(agent_id = %agent_id, kind = %kind, source = %source))]
    pub async fn schedule_job(
        &self,
        agent_id: &str,
        kind: JobKind,
        delay: Duration,
        source: CallSource,
    ) -> Result<Job> {
        ensure_authorized(agent_id, ControlOperation::Schedule, source)?;
        let agent = self.env.ctx.registry.require(agent_id)?;

        let now = self.env.ctx.clock.now();
        let scheduled_at = match kind {
            JobKind::Immediate => now,
            _ => add_duration(now, delay),
        };
        let max_retries = agent.config().retry_policy.max_attempts;

        let job = Job::new(agent_id, kind, scheduled_at, max_retries, source, now);
        let job_id = job.id.clone();
        self.env.ctx.jobs.insert(job.clone());
        self.env.stats.scheduled.fetch_add(1, Ordering::Relaxed);
        SchedulerMetrics::record_job_scheduled(kind);
        info!(job_id = %job_id, scheduled_at = %scheduled_at, "Job scheduled");

        if kind != JobKind::Immediate {
            return Ok(job);
        }

        let limit = self.env.config.read().max_concurrent;
        match self.gate.try_acquire(limit) {
            Some(slot) => match self.env.ctx.jobs.claim(&job_id, now) {
                Some(claimed) => {
                    // Dropping the caller must not strand the job in Running.
                    let (done_tx, done_rx) = oneshot::channel();
                    let env = self.env.clone();
                    let handle = tokio::spawn(async move {
                        execute(&env, claimed, slot).await;
                        let _ = done_tx.send(());
                    });
                    self.in_flight.lock().push(handle);
                    if done_rx.await.is_err() {
                        warn!(job_id = %job_id, "Immediate job execution did not finish cleanly");
                    }
                }
                None => drop(slot),
            },
            None => debug!(job_id = %job_id, "All slots busy, immediate job left pending"),
        }

        Ok(self.env.ctx.jobs.get(&job_id).unwrap_or(job))
    }

    /// Run one polling pass.
    ///
    /// Due jobs are admitted earliest first while slots remain; admitted
    /// bodies are spawned so the pass never waits on them.
    pub fn poll_due_jobs(&self) -> PollSummary {
        let config = self.config();
        if !config.enabled {
            return PollSummary::default();
        }

        let now = self.env.ctx.clock.now();
        let due = self.env.ctx.jobs.due(now);
        let mut summary = PollSummary {
            due: due.len(),
            ..Default::default()
        };

        for job_id in due {
            let Some(slot) = self.gate.try_acquire(config.max_concurrent) else {
                summary.deferred += 1;
                continue;
            };
            let Some(job) = self.env.ctx.jobs.claim(&job_id, now) else {
                continue;
            };

            summary.started += 1;
            let env = self.env.clone();
            let handle = tokio::spawn(async move { execute(&env, job, slot).await });
            self.in_flight.lock().push(handle);
        }

        self.in_flight.lock().retain(|handle| !handle.is_finished());

        if summary.due > 0 {
            debug!(
                due = summary.due,
                started = summary.started,
                deferred = summary.deferred,
                "Polling pass complete"
            );
        }
        summary
    }

    /// Wait for every execution spawned by polling passes so far.
    pub async fn join_in_flight(&self) {
        loop {
            let handles = std::mem::take(&mut *self.in_flight.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job execution task did not finish cleanly");
                }
            }
        }
    }

    /// Purge terminal jobs that finished more than `max_age` ago.
    pub fn cleanup_old_jobs(&self, max_age: Duration) -> usize {
        let removed = self
            .env
            .ctx
            .jobs
            .cleanup(max_age, self.env.ctx.clock.now());
        if removed > 0 {
            info!(removed, max_age_ms = max_age.as_millis() as u64, "Old jobs cleaned up");
        }
        SchedulerMetrics::record_jobs_cleaned(removed);
        removed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn job(&self, job_id: &JobId) -> Result<Job> {
        self.env
            .ctx
            .jobs
            .get(job_id)
            .ok_or_else(|| StewardError::job_not_found(job_id.as_str()))
    }

    pub fn jobs_for_agent(&self, agent_id: &str) -> Vec<Job> {
        self.env.ctx.jobs.for_agent(agent_id)
    }

    pub fn running_count(&self) -> usize {
        self.env.ctx.jobs.running_count()
    }

    pub fn len(&self) -> usize {
        self.env.ctx.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.env.ctx.jobs.is_empty()
    }

    pub fn slots_in_use(&self) -> usize {
        self.gate.in_use()
    }

    pub fn stats(&self) -> ExecutorStatsSnapshot {
        let stats = &self.env.stats;
        ExecutorStatsSnapshot {
            scheduled: stats.scheduled.load(Ordering::Relaxed),
            started: stats.started.load(Ordering::Relaxed),
            completed: stats.completed.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            retried: stats.retried.load(Ordering::Relaxed),
            timed_out: stats.timed_out.load(Ordering::Relaxed),
            peak_running: self.gate.peak.load(Ordering::Relaxed),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execution
// ═══════════════════════════════════════════════════════════════════════════════

enum Attempt {
    Succeeded(serde_json::Value),
    Faulted(String),
    TimedOut,
}

impl Attempt {
    fn from_body(
        outcome: std::result::Result<anyhow::Result<serde_json::Value>, Box<dyn Any + Send>>,
    ) -> Self {
        match outcome {
            Ok(Ok(value)) => Self::Succeeded(value),
            Ok(Err(e)) => Self::Faulted(format!("{:#}", e)),
            Err(panic) => Self::Faulted(format!("task panicked: {}", panic_message(&panic))),
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Run a claimed (Running) job to its next state. The slot is held until
/// the job's state has been written back.
async fn execute(env: &ExecutionEnv, job: Job, _slot: SlotGuard) {
    let jobs = &env.ctx.jobs;

    let Some(agent) = env.ctx.registry.get(&job.agent_id) else {
        let now = env.ctx.clock.now();
        jobs.update(&job.id, |j| j.fail(AGENT_NOT_FOUND_ERROR, now));
        env.stats.failed.fetch_add(1, Ordering::Relaxed);
        SchedulerMetrics::record_job_failed(&job.agent_id, "agent_not_found");
        warn!(job_id = %job.id, agent_id = %job.agent_id, "Agent missing, job failed");
        return;
    };

    let (timeout, base_delay) = {
        let config = env.config.read();
        (config.job_timeout, config.retry_base_delay)
    };
    let max_delay = agent.config().retry_policy.max_delay;

    env.stats.started.fetch_add(1, Ordering::Relaxed);
    debug!(job_id = %job.id, agent_id = %job.agent_id, attempt = job.retry_count + 1, "Job started");

    let started = Instant::now();
    let body = AssertUnwindSafe(agent.run_task(job.kind)).catch_unwind();
    let attempt = match timeout {
        Some(limit) => match tokio::time::timeout(limit, body).await {
            Ok(outcome) => Attempt::from_body(outcome),
            Err(_) => Attempt::TimedOut,
        },
        None => Attempt::from_body(body.await),
    };
    let elapsed = started.elapsed();
    let finished = env.ctx.clock.now();

    match attempt {
        Attempt::Succeeded(value) => {
            agent.record_execution(elapsed, true);
            jobs.update(&job.id, |j| j.complete(value, finished));
            env.stats.completed.fetch_add(1, Ordering::Relaxed);
            SchedulerMetrics::record_job_completed(&job.agent_id, elapsed);
            info!(
                job_id = %job.id,
                agent_id = %job.agent_id,
                duration_ms = elapsed.as_millis() as u64,
                "Job completed"
            );
        }
        Attempt::Faulted(error) => {
            agent.record_execution(elapsed, false);
            let outcome =
                jobs.update(&job.id, |j| j.record_fault(error.clone(), finished, base_delay, max_delay));
            match outcome {
                Some(FaultOutcome::Retry(at)) => {
                    env.stats.retried.fetch_add(1, Ordering::Relaxed);
                    SchedulerMetrics::record_job_retried(&job.agent_id);
                    warn!(
                        job_id = %job.id,
                        agent_id = %job.agent_id,
                        error = %error,
                        retry_at = %at,
                        "Job attempt failed, retry scheduled"
                    );
                }
                Some(FaultOutcome::Exhausted) => {
                    env.stats.failed.fetch_add(1, Ordering::Relaxed);
                    SchedulerMetrics::record_job_failed(&job.agent_id, "exhausted");
                    warn!(job_id = %job.id, agent_id = %job.agent_id, error = %error, "Job failed");
                }
                None => debug!(job_id = %job.id, "Job removed while running"),
            }
        }
        Attempt::TimedOut => {
            agent.record_execution(elapsed, false);
            jobs.update(&job.id, |j| j.fail(TIMEOUT_ERROR, finished));
            env.stats.timed_out.fetch_add(1, Ordering::Relaxed);
            env.stats.failed.fetch_add(1, Ordering::Relaxed);
            SchedulerMetrics::record_job_failed(&job.agent_id, "timeout");
            warn!(
                job_id = %job.id,
                agent_id = %job.agent_id,
                timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
                "Job timed out"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_respects_limit() {
        let gate = Arc::new(ConcurrencyGate::default());
        let first = gate.try_acquire(2).unwrap();
        let _second = gate.try_acquire(2).unwrap();
        assert!(gate.try_acquire(2).is_none());

        drop(first);
        assert_eq!(gate.in_use(), 1);
        assert!(gate.try_acquire(2).is_some());
        assert_eq!(gate.peak.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_gate_lowered_limit_blocks_admission() {
        let gate = Arc::new(ConcurrencyGate::default());
        let _a = gate.try_acquire(3).unwrap();
        let _b = gate.try_acquire(3).unwrap();
        assert!(gate.try_acquire(1).is_none());
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn Any + Send> = Box::new("exploded");
        assert_eq!(panic_message(&panic), "exploded");
        let panic: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&panic), "owned");
        let panic: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&panic), "unknown panic");
    }
}
