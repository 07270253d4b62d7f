//! Agent registry: ownership, bulk control, aggregate reporting and
//! lifecycle event observers.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::agent::{Agent, AgentReport, ConfigChange, RestartReport};
use super::config::AgentConfigPatch;
use super::state::AgentState;
use crate::clock::SharedClock;
use crate::error::{Result, StewardError};

// ═══════════════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle notification delivered to registry observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Registered { agent_id: String },
    Unregistered { agent_id: String },
    Started { agent_id: String },
    Stopped { agent_id: String },
    Failed { agent_id: String, error: String },
    Configured { agent_id: String, schedule_changed: bool },
}

impl AgentEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Registered { agent_id }
            | Self::Unregistered { agent_id }
            | Self::Started { agent_id }
            | Self::Stopped { agent_id }
            | Self::Failed { agent_id, .. }
            | Self::Configured { agent_id, .. } => agent_id,
        }
    }
}

/// Handle returned by [`AgentRegistry::subscribe`].
pub type ObserverId = u64;

type Observer = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-agent outcome of a bulk operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<AgentFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFailure {
    pub agent_id: String,
    pub error: String,
}

impl BulkOutcome {
    fn collect(ids: Vec<String>, results: Vec<Result<()>>) -> Self {
        let mut outcome = Self::default();
        for (agent_id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(()) => outcome.succeeded.push(agent_id),
                Err(e) => outcome.failed.push(AgentFailure {
                    agent_id,
                    error: e.user_message().to_string(),
                }),
            }
        }
        outcome
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Overall classification of the agent fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub status: SystemHealthStatus,
    pub total_agents: usize,
    pub running_agents: usize,
    pub error_agents: usize,
    pub agents: Vec<AgentReport>,
    pub timestamp: DateTime<Utc>,
}

/// Execution totals across every agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub total_agents: usize,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    /// Unweighted mean of each agent's own average.
    pub average_execution_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns every registered agent.
pub struct AgentRegistry {
    agents: DashMap<String, Arc<Agent>>,
    observers: RwLock<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
    clock: SharedClock,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agents.len())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            agents: DashMap::new(),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
            clock,
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────────

    /// Take ownership of an agent. Ids are unique.
    pub fn register(&self, agent: Agent) -> Result<Arc<Agent>> {
        let agent = Arc::new(agent);
        let agent_id = agent.id().to_string();

        match self.agents.entry(agent_id.clone()) {
            Entry::Occupied(_) => return Err(StewardError::duplicate_agent(&agent_id)),
            Entry::Vacant(slot) => {
                slot.insert(agent.clone());
            }
        }

        info!(agent_id = %agent_id, "Agent registered");
        self.notify(&AgentEvent::Registered { agent_id });
        Ok(agent)
    }

    /// Stop (if needed) and remove an agent.
    ///
    /// When the stop faults the agent stays registered and the fault is
    /// returned.
    pub async fn unregister(&self, agent_id: &str) -> Result<()> {
        let agent = self.require(agent_id)?;

        if agent.state() != AgentState::Stopped {
            if let Err(e) = agent.stop().await {
                self.notify(&AgentEvent::Failed {
                    agent_id: agent_id.to_string(),
                    error: e.user_message().to_string(),
                });
                return Err(e);
            }
        }

        self.agents.remove(agent_id);
        info!(agent_id = %agent_id, "Agent unregistered");
        self.notify(&AgentEvent::Unregistered {
            agent_id: agent_id.to_string(),
        });
        Ok(())
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(agent_id).map(|entry| entry.value().clone())
    }

    /// Like [`get`](Self::get), failing with `AgentNotFound`.
    pub fn require(&self, agent_id: &str) -> Result<Arc<Agent>> {
        self.get(agent_id)
            .ok_or_else(|| StewardError::agent_not_found(agent_id))
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// All agents, ordered by id.
    pub fn list(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<_> = self.agents.iter().map(|e| e.value().clone()).collect();
        agents.sort_by(|a, b| a.id().cmp(b.id()));
        agents
    }

    pub fn ids(&self) -> Vec<String> {
        self.list().iter().map(|a| a.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Single-Agent Control
    // ─────────────────────────────────────────────────────────────────────────

    /// Start one agent, initializing it first if it never was.
    pub async fn start(&self, agent_id: &str) -> Result<()> {
        let agent = self.require(agent_id)?;

        let result = async {
            if agent.state() == AgentState::Uninitialized {
                agent.initialize().await?;
            }
            agent.start().await
        }
        .await;

        self.report_outcome(agent_id, result, AgentEvent::Started {
            agent_id: agent_id.to_string(),
        })
    }

    pub async fn stop(&self, agent_id: &str) -> Result<()> {
        let agent = self.require(agent_id)?;
        let result = agent.stop().await;

        self.report_outcome(agent_id, result, AgentEvent::Stopped {
            agent_id: agent_id.to_string(),
        })
    }

    pub async fn restart(&self, agent_id: &str) -> Result<RestartReport> {
        let agent = self.require(agent_id)?;

        match agent.restart().await {
            Ok(report) => {
                self.notify(&AgentEvent::Started {
                    agent_id: agent_id.to_string(),
                });
                Ok(report)
            }
            Err(e) => {
                self.notify(&AgentEvent::Failed {
                    agent_id: agent_id.to_string(),
                    error: e.user_message().to_string(),
                });
                Err(e)
            }
        }
    }

    /// Apply a configuration patch and announce it to observers.
    pub async fn configure(&self, agent_id: &str, patch: &AgentConfigPatch) -> Result<ConfigChange> {
        let agent = self.require(agent_id)?;
        let change = agent.configure(patch).await?;

        self.notify(&AgentEvent::Configured {
            agent_id: agent_id.to_string(),
            schedule_changed: change.schedule_changed,
        });
        Ok(change)
    }

    fn report_outcome(&self, agent_id: &str, result: Result<()>, success: AgentEvent) -> Result<()> {
        match result {
            Ok(()) => {
                self.notify(&success);
                Ok(())
            }
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e.describe(), "Agent operation failed");
                self.notify(&AgentEvent::Failed {
                    agent_id: agent_id.to_string(),
                    error: e.user_message().to_string(),
                });
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk Control
    // ─────────────────────────────────────────────────────────────────────────

    /// Initialize every agent concurrently. Failures are isolated per agent.
    pub async fn initialize_all(&self) -> BulkOutcome {
        let agents = self.list();
        let ids = agents.iter().map(|a| a.id().to_string()).collect();
        let results = join_all(agents.iter().map(|agent| agent.initialize())).await;
        BulkOutcome::collect(ids, results)
    }

    /// Start every agent concurrently, initializing the uninitialized ones.
    pub async fn start_all(&self) -> BulkOutcome {
        let ids = self.ids();
        let results = join_all(ids.iter().map(|id| self.start(id))).await;
        let outcome = BulkOutcome::collect(ids, results);
        info!(
            started = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Started agents"
        );
        outcome
    }

    pub async fn stop_all(&self) -> BulkOutcome {
        let ids = self.ids();
        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        let outcome = BulkOutcome::collect(ids, results);
        info!(
            stopped = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Stopped agents"
        );
        outcome
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregation
    // ─────────────────────────────────────────────────────────────────────────

    pub fn system_health(&self) -> SystemHealth {
        let agents: Vec<AgentReport> = self.list().iter().map(|a| a.report()).collect();

        let total = agents.len();
        let running = agents.iter().filter(|a| a.state.is_running()).count();
        let errored = agents.iter().filter(|a| a.state.is_error()).count();

        let status = if errored > 0 {
            SystemHealthStatus::Critical
        } else if running < total {
            SystemHealthStatus::Warning
        } else {
            SystemHealthStatus::Healthy
        };

        SystemHealth {
            status,
            total_agents: total,
            running_agents: running,
            error_agents: errored,
            agents,
            timestamp: self.clock.now(),
        }
    }

    pub fn system_metrics(&self) -> SystemMetrics {
        let metrics: Vec<_> = self.list().iter().map(|a| a.metrics()).collect();

        let average = if metrics.is_empty() {
            0.0
        } else {
            metrics.iter().map(|m| m.average_execution_time_ms).sum::<f64>() / metrics.len() as f64
        };

        SystemMetrics {
            total_agents: metrics.len(),
            total_executions: metrics.iter().map(|m| m.total_executions).sum(),
            successful_executions: metrics.iter().map(|m| m.successful_executions).sum(),
            failed_executions: metrics.iter().map(|m| m.failed_executions).sum(),
            average_execution_time_ms: average,
            timestamp: self.clock.now(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a synchronous event callback.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    fn notify(&self, event: &AgentEvent) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        debug!(agent_id = %event.agent_id(), observers = observers.len(), "Dispatching agent event");
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                warn!(agent_id = %event.agent_id(), ?event, "Agent event observer panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDescriptor, FnAgent};
    use crate::clock::SystemClock;
    use crate::error::ErrorCode;
    use parking_lot::Mutex;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(SystemClock::shared())
    }

    fn agent(registry: &AgentRegistry, id: &str, behavior: FnAgent) -> Agent {
        Agent::new(
            AgentDescriptor::new(id, id),
            Arc::new(behavior),
            registry.clock().clone(),
        )
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = registry();
        registry
            .register(agent(&registry, "a", FnAgent::succeeding()))
            .unwrap();
        let err = registry
            .register(agent(&registry, "a", FnAgent::succeeding()))
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::DuplicateAgent);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_unknown() {
        let registry = registry();
        let err = registry.unregister("ghost").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AgentNotFound);
    }

    #[tokio::test]
    async fn test_bulk_start_isolates_failures() {
        let registry = registry();
        registry
            .register(agent(&registry, "good", FnAgent::succeeding()))
            .unwrap();
        registry
            .register(agent(
                &registry,
                "bad",
                FnAgent::succeeding().with_start_fault("boom"),
            ))
            .unwrap();

        let outcome = registry.start_all().await;
        assert_eq!(outcome.succeeded, vec!["good".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].agent_id, "bad");

        assert_eq!(registry.get("good").unwrap().state(), AgentState::Running);
        assert_eq!(registry.get("bad").unwrap().state(), AgentState::Error);
    }

    #[tokio::test]
    async fn test_observers_receive_events_despite_panics() {
        let registry = registry();
        let seen = Arc::new(Mutex::new(Vec::new()));

        registry.subscribe(|_| panic!("observer bug"));
        let sink = seen.clone();
        let id = registry.subscribe(move |event| sink.lock().push(event.clone()));

        registry
            .register(agent(&registry, "a", FnAgent::succeeding()))
            .unwrap();
        registry.start("a").await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                AgentEvent::Registered { agent_id: "a".into() },
                AgentEvent::Started { agent_id: "a".into() },
            ]
        );

        assert!(registry.unsubscribe(id));
        registry.stop("a").await.unwrap();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_metrics_mean_of_means() {
        let registry = registry();
        let a = registry
            .register(agent(&registry, "a", FnAgent::succeeding()))
            .unwrap();
        let b = registry
            .register(agent(&registry, "b", FnAgent::succeeding()))
            .unwrap();

        a.record_execution(std::time::Duration::from_millis(100), true);
        b.record_execution(std::time::Duration::from_millis(300), true);
        b.record_execution(std::time::Duration::from_millis(300), false);

        let metrics = registry.system_metrics();
        assert_eq!(metrics.total_executions, 3);
        assert_eq!(metrics.successful_executions, 2);
        assert_eq!(metrics.failed_executions, 1);
        assert!((metrics.average_execution_time_ms - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_registry_is_healthy() {
        let registry = registry();
        let health = registry.system_health();
        assert_eq!(health.status, SystemHealthStatus::Healthy);
        assert_eq!(registry.system_metrics().average_execution_time_ms, 0.0);
    }
}
