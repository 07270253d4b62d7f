//! Job records and their state machine.
//!
//! ```text
//! Pending ──(due & slot free)──▶ Running ──(ok)──▶ Completed
//!    ▲                              │
//!    └──(fault, attempts left)──────┤
//!                                   └──(fault exhausted | timeout)──▶ Failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::CallSource;
use crate::clock::add_duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Job identifier of the form `{agent_id}-{unix_millis}-{8 hex}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id for a job of `agent_id` created at `at`.
    pub fn generate(agent_id: &str, at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}-{}", agent_id, at.timestamp_millis(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Kind and State
// ═══════════════════════════════════════════════════════════════════════════════

/// How a job came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Requested for a later time
    Scheduled,
    /// Requested to run right away
    Immediate,
    /// Enqueued by the recurring driver
    Background,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Immediate => "immediate",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job
// ═══════════════════════════════════════════════════════════════════════════════

/// A unit of work bound to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(rename = "status")]
    pub state: JobState,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub source: CallSource,
    pub created_at: DateTime<Utc>,
}

/// What happened to a job after a faulted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Back to Pending, due again at the given time.
    Retry(DateTime<Utc>),
    /// Out of attempts.
    Exhausted,
}

impl Job {
    pub fn new(
        agent_id: impl Into<String>,
        kind: JobKind,
        scheduled_at: DateTime<Utc>,
        max_retries: u32,
        source: CallSource,
        now: DateTime<Utc>,
    ) -> Self {
        let agent_id = agent_id.into();
        Self {
            id: JobId::generate(&agent_id, now),
            agent_id,
            kind,
            state: JobState::Pending,
            scheduled_at,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries,
            source,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.scheduled_at <= now
    }

    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Running;
        self.started_at = Some(now);
    }

    pub(crate) fn complete(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.state = JobState::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
    }

    /// Fail for good, whatever the remaining attempts.
    pub(crate) fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }

    /// Record a faulted attempt.
    ///
    /// `max_retries` is the total number of attempts. While attempts remain
    /// the job goes back to Pending after `base_delay * retry_count`, capped
    /// at `max_delay`.
    pub(crate) fn record_fault(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
        base_delay: Duration,
        max_delay: Duration,
    ) -> FaultOutcome {
        self.error = Some(error.into());
        self.completed_at = Some(now);

        if self.retry_count < self.max_retries {
            self.retry_count += 1;
        }

        if self.retry_count < self.max_retries {
            let delay = base_delay.saturating_mul(self.retry_count).min(max_delay);
            let at = add_duration(now, delay);
            self.state = JobState::Pending;
            self.scheduled_at = at;
            self.started_at = None;
            FaultOutcome::Retry(at)
        } else {
            self.state = JobState::Failed;
            FaultOutcome::Exhausted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(max_retries: u32) -> Job {
        let now = Utc::now();
        Job::new("w1", JobKind::Scheduled, now, max_retries, CallSource::Tenant, now)
    }

    #[test]
    fn test_job_id_format() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let id = JobId::generate("leads-agent", at);
        let rest = id.as_str().strip_prefix("leads-agent-1700000000123-").unwrap();
        assert_eq!(rest.len(), 8);
        assert!(rest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_linear_backoff_until_exhausted() {
        let mut job = job(3);
        let now = job.created_at;
        let base = Duration::from_secs(30);
        let cap = Duration::from_secs(3600);

        job.mark_running(now);
        assert_eq!(
            job.record_fault("boom", now, base, cap),
            FaultOutcome::Retry(now + chrono::Duration::seconds(30))
        );
        assert_eq!(job.state, JobState::Pending);

        job.mark_running(now);
        assert_eq!(
            job.record_fault("boom", now, base, cap),
            FaultOutcome::Retry(now + chrono::Duration::seconds(60))
        );

        job.mark_running(now);
        assert_eq!(job.record_fault("boom", now, base, cap), FaultOutcome::Exhausted);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.retry_count, 3);
        assert!(job.retry_count <= job.max_retries);
    }

    #[test]
    fn test_backoff_capped_by_max_delay() {
        let mut job = job(5);
        let now = job.created_at;
        let outcome = job.record_fault(
            "boom",
            now,
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        assert_eq!(outcome, FaultOutcome::Retry(now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_zero_attempts_fails_immediately() {
        let mut job = job(0);
        let now = job.created_at;
        let outcome = job.record_fault("boom", now, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(outcome, FaultOutcome::Exhausted);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(job(3)).unwrap();
        assert_eq!(json["agentId"], "w1");
        assert_eq!(json["type"], "scheduled");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["maxRetries"], 3);
        assert_eq!(json["source"], "tenant");
    }
}
