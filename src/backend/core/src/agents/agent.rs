//! A managed background agent: identity, lifecycle and health bookkeeping.
//!
//! The agent itself is a generic shell. What it actually does is supplied by
//! an [`AgentBehavior`] implementation, which the lifecycle calls into at the
//! right moments and which the job executor invokes to run task bodies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::config::{AgentConfig, AgentConfigPatch};
use super::health::{
    health_percentage, status_for_percentage, AgentHealth, AgentMetrics, HealthIssue,
    IssueSeverity, PerformanceSnapshot,
};
use super::state::AgentState;
use crate::clock::{Clock, SharedClock};
use crate::error::{ErrorCode, Result, StewardError};
use crate::jobs::JobKind;
use crate::telemetry::AgentMetricsRecorder;
use crate::ticker::Ticker;

/// Default cadence of the internal self-check while an agent is running.
pub const DEFAULT_SELF_CHECK_INTERVAL: Duration = Duration::from_secs(60);

// ═══════════════════════════════════════════════════════════════════════════════
// Behavior
// ═══════════════════════════════════════════════════════════════════════════════

/// The work an agent performs.
///
/// Every hook except [`run_task`](AgentBehavior::run_task) has a no-op
/// default. Faults are reported as `anyhow` errors and folded into the
/// agent's state and health by the caller.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    /// Acquire resources before the first start.
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources. Called on stop, restart and unregistration.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// React to a change of `enabled` or `schedule_interval`.
    async fn reconfigure(&self, _config: &AgentConfig) -> anyhow::Result<()> {
        Ok(())
    }

    /// Execute one unit of work for a job of the given kind.
    async fn run_task(&self, kind: JobKind) -> anyhow::Result<serde_json::Value>;

    /// Report current problems. The result replaces the agent's issue list.
    async fn self_check(&self) -> Vec<HealthIssue> {
        Vec::new()
    }

    fn performance(&self) -> PerformanceSnapshot {
        PerformanceSnapshot::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Descriptors and Reports
// ═══════════════════════════════════════════════════════════════════════════════

/// Static identity of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Listing entry for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    #[serde(flatten)]
    pub descriptor: AgentDescriptor,
    pub state: AgentState,
    pub config: AgentConfig,
}

/// Per-agent line of a system health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub id: String,
    pub name: String,
    pub state: AgentState,
    pub health: AgentHealth,
}

/// Outcome of a successful restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartReport {
    /// Teardown fault that was overridden to let the start proceed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_error: Option<String>,
}

/// Result of applying a configuration patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChange {
    pub config: AgentConfig,
    pub schedule_changed: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Agent
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct AgentInner {
    state: AgentState,
    config: AgentConfig,
    issues: Vec<HealthIssue>,
    last_check: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    metrics: AgentMetrics,
    initialized: bool,
}

/// A registered agent.
///
/// Lifecycle calls are serialized per agent; reads (`state`, `health`,
/// `metrics`) never wait on them.
pub struct Agent {
    descriptor: AgentDescriptor,
    behavior: Arc<dyn AgentBehavior>,
    clock: SharedClock,
    inner: Arc<RwLock<AgentInner>>,
    self_check: Mutex<Option<Ticker>>,
    self_check_interval: Duration,
    lifecycle: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.descriptor.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Agent {
    pub fn new(
        descriptor: AgentDescriptor,
        behavior: Arc<dyn AgentBehavior>,
        clock: SharedClock,
    ) -> Self {
        Self {
            descriptor,
            behavior,
            clock,
            inner: Arc::new(RwLock::new(AgentInner::default())),
            self_check: Mutex::new(None),
            self_check_interval: DEFAULT_SELF_CHECK_INTERVAL,
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Builder: initial configuration.
    pub fn with_config(self, config: AgentConfig) -> Self {
        self.inner.write().config = config;
        self
    }

    /// Builder: self-check cadence.
    pub fn with_self_check_interval(mut self, interval: Duration) -> Self {
        self.self_check_interval = interval;
        self
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> AgentState {
        self.inner.read().state
    }

    pub fn config(&self) -> AgentConfig {
        self.inner.read().config.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.read().config.enabled
    }

    pub fn info(&self) -> AgentInfo {
        let inner = self.inner.read();
        AgentInfo {
            descriptor: self.descriptor.clone(),
            state: inner.state,
            config: inner.config.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Run the initialization hook. Allowed from Uninitialized or Stopped;
    /// success leaves the agent in Initializing, ready to start.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.initialize_locked().await
    }

    async fn initialize_locked(&self) -> Result<()> {
        self.transition(AgentState::Initializing)?;

        match self.behavior.initialize().await {
            Ok(()) => {
                self.inner.write().initialized = true;
                info!("Agent initialized");
                Ok(())
            }
            Err(e) => Err(self.fail(ErrorCode::AgentInitializationFailed, e)),
        }
    }

    /// Start the agent from Initializing (ready) or Stopped.
    ///
    /// A stopped agent that was never initialized is initialized first.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<()> {
        let (state, initialized) = {
            let inner = self.inner.read();
            (inner.state, inner.initialized)
        };

        match state {
            AgentState::Initializing => {}
            AgentState::Stopped if !initialized => self.initialize_locked().await?,
            AgentState::Stopped => {}
            other => {
                return Err(StewardError::invalid_state_transition(
                    &self.descriptor.id,
                    other,
                    AgentState::Running,
                ))
            }
        }

        if let Err(e) = self.behavior.start().await {
            return Err(self.fail(ErrorCode::AgentStartFailed, e));
        }

        self.transition(AgentState::Running)?;
        {
            let now = self.clock.now();
            let mut inner = self.inner.write();
            inner.started_at = Some(now);
            inner.issues.clear();
        }
        self.spawn_self_check();

        info!("Agent started");
        Ok(())
    }

    /// Stop the agent. Stopping a stopped agent is a no-op.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.stop_locked().await
    }

    async fn stop_locked(&self) -> Result<()> {
        match self.state() {
            AgentState::Stopped => {
                debug!("Agent already stopped");
                return Ok(());
            }
            AgentState::Uninitialized => {
                self.transition(AgentState::Stopped)?;
                return Ok(());
            }
            _ => {}
        }

        self.cancel_self_check().await;

        if let Err(e) = self.behavior.stop().await {
            return Err(self.fail(ErrorCode::AgentStopFailed, e));
        }

        self.transition(AgentState::Stopped)?;
        self.inner.write().started_at = None;

        info!("Agent stopped");
        Ok(())
    }

    /// Stop then start. A teardown fault does not prevent the start: the
    /// agent is forced to Stopped and the fault is carried in the report.
    #[instrument(skip(self), fields(agent_id = %self.descriptor.id))]
    pub async fn restart(&self) -> Result<RestartReport> {
        let _guard = self.lifecycle.lock().await;

        let stop_error = match self.stop_locked().await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e.describe(), "Stop failed during restart, forcing stopped state");
                self.transition(AgentState::Stopped)?;
                self.inner.write().started_at = None;
                Some(e.describe())
            }
        };

        match self.start_locked().await {
            Ok(()) => Ok(RestartReport { stop_error }),
            Err(e) => Err(match stop_error {
                Some(stop_error) => e.with_context("stopError", stop_error),
                None => e,
            }),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.expect_state(AgentState::Running, AgentState::Paused)?;
        self.transition(AgentState::Paused)?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.expect_state(AgentState::Paused, AgentState::Running)?;
        self.transition(AgentState::Running)?;
        Ok(())
    }

    pub async fn enter_maintenance(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.expect_state(AgentState::Running, AgentState::Maintenance)?;
        self.transition(AgentState::Maintenance)?;
        Ok(())
    }

    pub async fn exit_maintenance(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.expect_state(AgentState::Maintenance, AgentState::Running)?;
        self.transition(AgentState::Running)?;
        Ok(())
    }

    fn expect_state(&self, expected: AgentState, next: AgentState) -> Result<()> {
        let current = self.state();
        if current != expected {
            return Err(StewardError::invalid_state_transition(
                &self.descriptor.id,
                current,
                next,
            ));
        }
        Ok(())
    }

    fn transition(&self, next: AgentState) -> Result<AgentState> {
        let mut inner = self.inner.write();
        let current = inner.state;
        if !current.can_transition_to(next) {
            return Err(StewardError::invalid_state_transition(
                &self.descriptor.id,
                current,
                next,
            ));
        }
        inner.state = next;
        drop(inner);
        AgentMetricsRecorder::record_transition(&self.descriptor.id, next.as_str());
        debug!(agent_id = %self.descriptor.id, from = %current, to = %next, "Agent state changed");
        Ok(current)
    }

    /// Move to Error, record the fault as an issue and build the error.
    fn fail(&self, code: ErrorCode, cause: anyhow::Error) -> StewardError {
        let now = self.clock.now();
        {
            let mut inner = self.inner.write();
            inner.state = AgentState::Error;
            AgentMetricsRecorder::record_transition(&self.descriptor.id, AgentState::Error.as_str());
            inner.issues.push(HealthIssue::new(
                IssueSeverity::High,
                code.to_string(),
                format!("{:#}", cause),
                now,
            ));
        }
        StewardError::lifecycle_failed(code, &self.descriptor.id, format!("{:#}", cause))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────────

    /// Shallow-merge a configuration patch.
    ///
    /// Invalid values are rejected before anything changes. When `enabled`
    /// or the schedule interval moves, the behavior is told about it.
    #[instrument(skip(self, patch), fields(agent_id = %self.descriptor.id))]
    pub async fn configure(&self, patch: &AgentConfigPatch) -> Result<ConfigChange> {
        let (config, schedule_changed) = {
            let mut inner = self.inner.write();
            let next = inner.config.merged(patch)?;
            let changed = inner.config.schedule_changed(&next);
            inner.config = next.clone();
            (next, changed)
        };

        if schedule_changed {
            if let Err(e) = self.behavior.reconfigure(&config).await {
                let now = self.clock.now();
                self.inner.write().issues.push(HealthIssue::new(
                    IssueSeverity::Medium,
                    ErrorCode::ConfigurationError.to_string(),
                    format!("{:#}", e),
                    now,
                ));
                return Err(StewardError::with_internal(
                    ErrorCode::ConfigurationError,
                    format!("Agent {} failed to apply configuration", self.descriptor.id),
                    format!("{:#}", e),
                )
                .with_context("agentId", &self.descriptor.id));
            }
        }

        info!(schedule_changed, "Agent configured");
        Ok(ConfigChange {
            config,
            schedule_changed,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Work and Health
    // ─────────────────────────────────────────────────────────────────────────

    /// Invoke the behavior's task body.
    pub async fn run_task(&self, kind: JobKind) -> anyhow::Result<serde_json::Value> {
        self.behavior.run_task(kind).await
    }

    /// Fold one execution outcome into the agent's metrics.
    pub fn record_execution(&self, duration: Duration, success: bool) {
        let now = self.clock.now();
        self.inner.write().metrics.record(duration, success, now);
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.inner.read().metrics.clone()
    }

    /// Current health snapshot. Pure read.
    pub fn health(&self) -> AgentHealth {
        let now = self.clock.now();
        let mut performance = self.behavior.performance();
        let inner = self.inner.read();

        if performance.response_time_ms == 0.0 {
            performance.response_time_ms = inner.metrics.average_execution_time_ms;
        }

        let percentage = health_percentage(inner.state, &inner.issues);
        AgentHealth {
            status: status_for_percentage(percentage),
            health_percentage: percentage,
            uptime_secs: inner
                .started_at
                .map(|at| (now - at).num_seconds().max(0) as u64)
                .unwrap_or(0),
            last_check: inner.last_check,
            issues: inner.issues.clone(),
            performance,
        }
    }

    pub fn report(&self) -> AgentReport {
        AgentReport {
            id: self.descriptor.id.clone(),
            name: self.descriptor.name.clone(),
            state: self.state(),
            health: self.health(),
        }
    }

    /// Run one self-check pass now. Does nothing unless the agent is running.
    pub async fn run_self_check(&self) {
        self_check_pass(&self.behavior, &self.inner, &self.clock).await;
    }

    fn spawn_self_check(&self) {
        let behavior = self.behavior.clone();
        let inner = self.inner.clone();
        let clock = self.clock.clone();

        let ticker = Ticker::spawn(
            format!("self-check:{}", self.descriptor.id),
            self.self_check_interval,
            move || {
                let behavior = behavior.clone();
                let inner = inner.clone();
                let clock = clock.clone();
                async move { self_check_pass(&behavior, &inner, &clock).await }
            },
        );

        if let Some(previous) = self.self_check.lock().replace(ticker) {
            previous.stop();
        }
    }

    async fn cancel_self_check(&self) {
        let ticker = self.self_check.lock().take();
        if let Some(ticker) = ticker {
            ticker.shutdown().await;
        }
    }
}

async fn self_check_pass(
    behavior: &Arc<dyn AgentBehavior>,
    inner: &RwLock<AgentInner>,
    clock: &SharedClock,
) {
    let running = inner.read().state.is_running();
    if !running {
        return;
    }

    let issues = behavior.self_check().await;
    let now = clock.now();
    let mut guard = inner.write();
    if !issues.is_empty() {
        debug!(issues = issues.len(), "Self-check reported issues");
    }
    guard.issues = issues;
    guard.last_check = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::FnAgent;
    use crate::clock::ManualClock;
    use crate::health::HealthStatus;
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn agent(behavior: FnAgent) -> Agent {
        Agent::new(
            AgentDescriptor::new("test-agent", "Test Agent"),
            Arc::new(behavior),
            Arc::new(ManualClock::starting_now()),
        )
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let agent = agent(FnAgent::succeeding());
        assert_eq!(agent.state(), AgentState::Uninitialized);

        agent.initialize().await.unwrap();
        assert_eq!(agent.state(), AgentState::Initializing);

        agent.start().await.unwrap();
        assert_eq!(agent.state(), AgentState::Running);

        agent.pause().await.unwrap();
        assert_eq!(agent.state(), AgentState::Paused);
        agent.resume().await.unwrap();

        agent.enter_maintenance().await.unwrap();
        assert_eq!(agent.state(), AgentState::Maintenance);
        agent.exit_maintenance().await.unwrap();

        agent.stop().await.unwrap();
        assert_eq!(agent.state(), AgentState::Stopped);
    }

    #[test]
    fn test_stopped_transitions_are_counted() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let plain = Agent::new(
                    AgentDescriptor::new("plain", "Plain"),
                    Arc::new(FnAgent::succeeding()),
                    Arc::new(ManualClock::starting_now()),
                );
                plain.start().await.unwrap_err();
                plain.stop().await.unwrap();
                plain.start().await.unwrap();
                plain.stop().await.unwrap();

                let flaky = Agent::new(
                    AgentDescriptor::new("flaky", "Flaky"),
                    Arc::new(FnAgent::succeeding().with_stop_fault("teardown failed")),
                    Arc::new(ManualClock::starting_now()),
                );
                flaky.initialize().await.unwrap();
                flaky.start().await.unwrap();
                let report = flaky.restart().await.unwrap();
                assert!(report.stop_error.is_some());
                flaky.cancel_self_check().await;
            })
        });

        let rendered = handle.render();
        let stopped = |id: &str| {
            rendered
                .lines()
                .find(|line| {
                    line.starts_with("steward_agent_transitions_total")
                        && line.contains(&format!("agent_id=\"{}\"", id))
                        && line.contains("state=\"stopped\"")
                })
                .and_then(|line| line.rsplit(' ').next())
                .map(str::to_string)
        };
        assert_eq!(stopped("plain").as_deref(), Some("2"));
        assert_eq!(stopped("flaky").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_start_requires_ready() {
        let agent = agent(FnAgent::succeeding());
        let err = agent.start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert_eq!(agent.state(), AgentState::Uninitialized);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let agent = agent(FnAgent::succeeding());
        agent.initialize().await.unwrap();
        agent.start().await.unwrap();
        agent.record_execution(Duration::from_millis(10), true);
        agent.stop().await.unwrap();

        let metrics = agent.metrics();
        let health = agent.health();
        agent.stop().await.unwrap();

        assert_eq!(agent.state(), AgentState::Stopped);
        assert_eq!(agent.metrics(), metrics);
        assert_eq!(agent.health(), health);
    }

    #[tokio::test]
    async fn test_init_fault_moves_to_error() {
        let agent = agent(FnAgent::succeeding().with_init_fault("no credentials"));
        let err = agent.initialize().await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::AgentInitializationFailed);
        assert_eq!(agent.state(), AgentState::Error);
        assert_eq!(agent.health().issues.len(), 1);
        assert_eq!(agent.health().status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_restart_survives_stop_fault() {
        let agent = agent(FnAgent::succeeding().with_stop_fault("socket busy"));
        agent.initialize().await.unwrap();
        agent.start().await.unwrap();

        let report = agent.restart().await.unwrap();
        assert!(report.stop_error.unwrap().contains("socket busy"));
        assert_eq!(agent.state(), AgentState::Running);
    }

    #[tokio::test]
    async fn test_stop_from_stopped_restarts_without_reinit() {
        let agent = agent(FnAgent::succeeding());
        agent.stop().await.unwrap();
        assert_eq!(agent.state(), AgentState::Stopped);

        // Never initialized, so start runs the init hook first.
        agent.start().await.unwrap();
        assert_eq!(agent.state(), AgentState::Running);
    }

    #[tokio::test]
    async fn test_configure_reports_schedule_change() {
        let agent = agent(FnAgent::succeeding());
        let change = agent
            .configure(&AgentConfigPatch {
                schedule_interval_ms: Some(1_000),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(change.schedule_changed);
        assert_eq!(agent.config().schedule_interval, Duration::from_secs(1));

        let change = agent
            .configure(&AgentConfigPatch {
                log_level: Some("debug".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!change.schedule_changed);
    }

    #[tokio::test]
    async fn test_invalid_config_leaves_agent_untouched() {
        let agent = agent(FnAgent::succeeding());
        let before = agent.config();
        let err = agent
            .configure(&AgentConfigPatch {
                schedule_interval_ms: Some(0),
                enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
        assert_eq!(agent.config(), before);
    }

    #[tokio::test]
    async fn test_health_defaults_before_init() {
        let agent = agent(FnAgent::succeeding());
        let health = agent.health();
        assert_eq!(health.health_percentage, 0.0);
        assert_eq!(health.uptime_secs, 0);
        assert!(health.issues.is_empty());
        assert_eq!(agent.metrics(), AgentMetrics::default());
    }

    #[tokio::test]
    async fn test_self_check_replaces_issues() {
        let agent = agent(FnAgent::succeeding().with_self_check(|| {
            vec![HealthIssue::new(
                IssueSeverity::Low,
                "SLOW",
                "responses are slow",
                Utc::now(),
            )]
        }));
        agent.initialize().await.unwrap();
        agent.start().await.unwrap();

        agent.run_self_check().await;
        let health = agent.health();
        assert_eq!(health.issues.len(), 1);
        assert!(health.last_check.is_some());
        // (1.0 + 0.7) / 2
        assert!((health.health_percentage - 85.0).abs() < 1e-9);
        assert_eq!(health.status, HealthStatus::Healthy);
    }
}
