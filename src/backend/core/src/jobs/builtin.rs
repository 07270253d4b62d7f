//! Built-in agents.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::job::JobKind;
use super::queue::JobStore;
use crate::agents::{Agent, AgentBehavior, AgentConfig, AgentDescriptor};
use crate::clock::SharedClock;

/// Registry id of the janitor agent.
pub const JANITOR_AGENT_ID: &str = "job-janitor";

/// Agent whose task purges finished jobs older than `max_age`.
#[derive(Debug)]
pub struct JobJanitor {
    jobs: Arc<JobStore>,
    clock: SharedClock,
    max_age: Duration,
}

impl JobJanitor {
    pub fn new(jobs: Arc<JobStore>, clock: SharedClock, max_age: Duration) -> Self {
        Self {
            jobs,
            clock,
            max_age,
        }
    }

    /// Wrap the janitor in an agent that runs every `interval`.
    pub fn into_agent(self, interval: Duration) -> Agent {
        let clock = self.clock.clone();
        Agent::new(
            AgentDescriptor::new(JANITOR_AGENT_ID, "Job Janitor")
                .with_description("Purges completed and failed jobs past their retention age"),
            Arc::new(self),
            clock,
        )
        .with_config(AgentConfig::default().with_schedule_interval(interval))
    }
}

#[async_trait]
impl AgentBehavior for JobJanitor {
    async fn run_task(&self, _kind: JobKind) -> anyhow::Result<serde_json::Value> {
        let removed = self.jobs.cleanup(self.max_age, self.clock.now());
        tracing::debug!(removed, "Janitor pass complete");
        Ok(json!({
            "removed": removed,
            "maxAgeMs": self.max_age.as_millis() as u64,
        }))
    }
}
