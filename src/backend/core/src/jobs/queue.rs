//! In-memory job store.
//!
//! Every mutation happens under a short synchronous write lock; nothing here
//! awaits while holding it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::job::{Job, JobId, JobState};

/// Job counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Jobs keyed by id.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        self.jobs.write().insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    /// Jobs of one agent, oldest first.
    pub fn for_agent(&self, agent_id: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|job| job.agent_id == agent_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Ids of Pending jobs due at `now`, earliest `scheduled_at` first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let jobs = self.jobs.read();
        let mut due: Vec<&Job> = jobs.values().filter(|job| job.is_due(now)).collect();
        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        due.into_iter().map(|job| job.id.clone()).collect()
    }

    /// Move a due Pending job to Running. Returns the claimed snapshot, or
    /// `None` when the job is gone or was claimed by someone else.
    pub fn claim(&self, id: &JobId, now: DateTime<Utc>) -> Option<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(id)?;
        if !job.is_due(now) {
            return None;
        }
        job.mark_running(now);
        Some(job.clone())
    }

    /// Apply `f` to a stored job. Returns `None` when the job is gone.
    pub fn update<R>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.jobs.write().get_mut(id).map(f)
    }

    /// Remove terminal jobs that finished more than `max_age` before `now`.
    pub fn cleanup(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut jobs = self.jobs.write();
        let before = jobs.len();

        jobs.retain(|_, job| {
            let expired = job.state.is_terminal()
                && job
                    .completed_at
                    .map(|done| now.signed_duration_since(done) > max_age)
                    .unwrap_or(false);
            !expired
        });

        before - jobs.len()
    }

    pub fn counts(&self) -> JobCounts {
        let jobs = self.jobs.read();
        let mut counts = JobCounts {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs.values() {
            match job.state {
                JobState::Pending => counts.pending += 1,
                JobState::Running => counts.running += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|job| job.state == JobState::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}
