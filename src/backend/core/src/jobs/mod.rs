//! Job scheduling and execution.
//!
//! ```text
//! ┌──────────────┐  schedule_job   ┌──────────┐  poll_due_jobs  ┌─────────────┐
//! │  API / CLI   │────────────────▶│ JobStore │────────────────▶│ JobExecutor │
//! └──────────────┘                 └──────────┘   (slot gate)   └──────┬──────┘
//!         ▲                              ▲                             │
//!         │ status / config              │ Background jobs             │ run_task
//! ┌───────┴──────┐                ┌──────┴──────────┐           ┌──────▼──────┐
//! │  Scheduler   │───────────────▶│ RecurringDriver │           │    Agent    │
//! └──────────────┘                └─────────────────┘           └─────────────┘
//! ```
//!
//! Authorization is checked at the mutating entry points before any state
//! changes. Polling and recurring timers run on [`crate::ticker::Ticker`]s.

mod builtin;
mod config;
mod executor;
mod job;
mod queue;
mod recurring;
mod scheduler;

pub use builtin::{JobJanitor, JANITOR_AGENT_ID};
pub use config::{ScheduleConfig, ScheduleConfigPatch};
pub use executor::{
    ExecutorStatsSnapshot, JobExecutor, PollSummary, AGENT_NOT_FOUND_ERROR, TIMEOUT_ERROR,
};
pub use job::{FaultOutcome, Job, JobId, JobKind, JobState};
pub use queue::{JobCounts, JobStore};
pub use recurring::RecurringDriver;
pub use scheduler::{Scheduler, SchedulerStatus};
