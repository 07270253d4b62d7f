//! Integration tests for the agent registry.
//!
//! Tests cover:
//! - Registration, lookup and removal
//! - Lifecycle control and its error mapping
//! - Bulk start/stop with per-agent failure isolation
//! - System health classification and metrics aggregation
//! - Registry events

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use steward_core::agents::{
    Agent, AgentConfigPatch, AgentDescriptor, AgentEvent, AgentRegistry, AgentState, FnAgent,
    HealthIssue, IssueSeverity, SystemHealthStatus,
};
use steward_core::clock::{Clock, ManualClock};
use steward_core::error::ErrorCode;
use steward_core::health::HealthStatus;

// ============================================================================
// Helpers
// ============================================================================

fn registry() -> (Arc<ManualClock>, AgentRegistry) {
    let clock = Arc::new(ManualClock::starting_now());
    (clock.clone(), AgentRegistry::new(clock))
}

fn agent(registry: &AgentRegistry, id: &str, behavior: FnAgent) -> Agent {
    Agent::new(
        AgentDescriptor::new(id, format!("Agent {}", id)),
        Arc::new(behavior),
        registry.clock().clone(),
    )
}

fn register(registry: &AgentRegistry, id: &str, behavior: FnAgent) -> Arc<Agent> {
    registry.register(agent(registry, id, behavior)).unwrap()
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_register_and_lookup() {
    let (_clock, registry) = registry();
    register(&registry, "w1", FnAgent::succeeding());
    register(&registry, "w2", FnAgent::succeeding());

    assert_eq!(registry.len(), 2);
    assert!(registry.contains("w1"));
    assert!(registry.get("w3").is_none());
    assert_eq!(registry.require("w3").unwrap_err().code(), ErrorCode::AgentNotFound);

    let mut ids = registry.ids();
    ids.sort();
    assert_eq!(ids, vec!["w1".to_string(), "w2".to_string()]);
}

#[test]
fn test_duplicate_registration_rejected() {
    let (_clock, registry) = registry();
    register(&registry, "w1", FnAgent::succeeding());

    let error = registry
        .register(agent(&registry, "w1", FnAgent::succeeding()))
        .unwrap_err();
    assert_eq!(error.code(), ErrorCode::DuplicateAgent);
    assert_eq!(error.http_status().as_u16(), 409);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_unregister_stops_agent() {
    let (_clock, registry) = registry();
    let w1 = register(&registry, "w1", FnAgent::succeeding());
    assert_ok!(registry.start("w1").await);

    assert_ok!(registry.unregister("w1").await);
    assert_eq!(w1.state(), AgentState::Stopped);
    assert!(registry.is_empty());
    assert_err!(registry.unregister("w1").await);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_initializes_on_demand() {
    let (_clock, registry) = registry();
    let w1 = register(&registry, "w1", FnAgent::succeeding());
    assert_eq!(w1.state(), AgentState::Uninitialized);

    assert_ok!(registry.start("w1").await);
    assert_eq!(w1.state(), AgentState::Running);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (_clock, registry) = registry();
    let w1 = register(&registry, "w1", FnAgent::succeeding());
    registry.start("w1").await.unwrap();

    assert_ok!(registry.stop("w1").await);
    assert_ok!(registry.stop("w1").await);
    assert_eq!(w1.state(), AgentState::Stopped);
}

#[tokio::test]
async fn test_start_twice_is_invalid_transition() {
    let (_clock, registry) = registry();
    register(&registry, "w1", FnAgent::succeeding());
    registry.start("w1").await.unwrap();

    let error = registry.start("w1").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::InvalidStateTransition);
}

#[tokio::test]
async fn test_start_fault_moves_agent_to_error() {
    let (_clock, registry) = registry();
    let w1 = register(&registry, "w1", FnAgent::succeeding().with_start_fault("port in use"));

    let error = registry.start("w1").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::AgentStartFailed);
    assert!(!error.user_message().contains("port in use"));
    assert_eq!(w1.state(), AgentState::Error);

    let health = w1.health();
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert!(health.issues.iter().any(|i| i.severity == IssueSeverity::High));
}

#[tokio::test]
async fn test_restart_survives_stop_fault() {
    let (_clock, registry) = registry();
    let w1 = register(&registry, "w1", FnAgent::succeeding().with_stop_fault("flush failed"));
    registry.start("w1").await.unwrap();

    let report = registry.restart("w1").await.unwrap();
    assert!(report.stop_error.is_some());
    assert_eq!(w1.state(), AgentState::Running);
}

#[tokio::test]
async fn test_configure_reports_schedule_change() {
    let (_clock, registry) = registry();
    register(&registry, "w1", FnAgent::succeeding());

    let change = registry
        .configure(
            "w1",
            &AgentConfigPatch {
                schedule_interval_ms: Some(15_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(change.schedule_changed);
    assert_eq!(change.config.schedule_interval, Duration::from_secs(15));

    let invalid = registry
        .configure(
            "w1",
            &AgentConfigPatch {
                schedule_interval_ms: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(invalid.http_status().as_u16(), 400);
    assert_eq!(
        registry.require("w1").unwrap().config().schedule_interval,
        Duration::from_secs(15)
    );
}

// ============================================================================
// Bulk Operations
// ============================================================================

#[tokio::test]
async fn test_start_all_isolates_failures() {
    let (_clock, registry) = registry();
    register(&registry, "ok-1", FnAgent::succeeding());
    register(&registry, "ok-2", FnAgent::succeeding());
    register(&registry, "broken", FnAgent::succeeding().with_init_fault("missing credentials"));

    let outcome = registry.start_all().await;
    assert_eq!(outcome.succeeded.len(), 2);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].agent_id, "broken");
    assert!(!outcome.all_succeeded());

    let stopped = registry.stop_all().await;
    assert_eq!(stopped.failed.len(), 0);
}

// ============================================================================
// System Health
// ============================================================================

#[tokio::test]
async fn test_system_health_classification() {
    let (_clock, registry) = registry();
    register(&registry, "w1", FnAgent::succeeding());
    register(&registry, "w2", FnAgent::succeeding());
    register(&registry, "w3", FnAgent::succeeding().with_init_fault("bad config"));

    registry.start("w1").await.unwrap();
    registry.start("w2").await.unwrap();
    assert_err!(registry.start("w3").await);

    let health = registry.system_health();
    assert_eq!(health.status, SystemHealthStatus::Critical);
    assert_eq!(health.error_agents, 1);
    assert_eq!(health.total_agents, 3);

    // No agent in Error, one stopped.
    registry.unregister("w3").await.unwrap();
    register(&registry, "w3", FnAgent::succeeding());
    registry.start("w3").await.unwrap();
    registry.stop("w2").await.unwrap();
    assert_eq!(registry.system_health().status, SystemHealthStatus::Warning);

    registry.start("w2").await.unwrap();
    let health = registry.system_health();
    assert_eq!(health.status, SystemHealthStatus::Healthy);
    assert_eq!(health.running_agents, 3);
}

#[tokio::test]
async fn test_self_check_issues_lower_health() {
    let (clock, registry) = registry();
    let at = clock.now();
    let w1 = register(
        &registry,
        "w1",
        FnAgent::succeeding().with_self_check(move || {
            vec![HealthIssue::new(IssueSeverity::Critical, "DOWN", "upstream down", at)]
        }),
    );
    registry.start("w1").await.unwrap();
    assert_eq!(w1.health().status, HealthStatus::Healthy);

    w1.run_self_check().await;
    let health = w1.health();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!((health.health_percentage - 50.0).abs() < 1e-6);
    assert_eq!(health.issues.len(), 1);
    assert!(health.last_check.is_some());
}

#[tokio::test]
async fn test_system_metrics_mean_of_means() {
    let (_clock, registry) = registry();
    let w1 = register(&registry, "w1", FnAgent::succeeding());
    let w2 = register(&registry, "w2", FnAgent::succeeding());

    w1.record_execution(Duration::from_millis(100), true);
    w1.record_execution(Duration::from_millis(300), false);
    w2.record_execution(Duration::from_millis(600), true);

    let metrics = registry.system_metrics();
    assert_eq!(metrics.total_executions, 3);
    assert_eq!(metrics.successful_executions, 2);
    assert_eq!(metrics.failed_executions, 1);
    // (200 + 600) / 2, not weighted by call volume
    assert!((metrics.average_execution_time_ms - 400.0).abs() < 1e-6);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_observers_receive_events() {
    let (_clock, registry) = registry();
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let id = registry.subscribe(move |event: &AgentEvent| {
        let label = match event {
            AgentEvent::Registered { .. } => "registered",
            AgentEvent::Unregistered { .. } => "unregistered",
            AgentEvent::Started { .. } => "started",
            AgentEvent::Stopped { .. } => "stopped",
            AgentEvent::Failed { .. } => "failed",
            AgentEvent::Configured { .. } => "configured",
        };
        sink.lock().push(format!("{}:{}", label, event.agent_id()));
    });

    register(&registry, "w1", FnAgent::succeeding());
    registry.start("w1").await.unwrap();
    registry.stop("w1").await.unwrap();
    registry.unregister("w1").await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec!["registered:w1", "started:w1", "stopped:w1", "unregistered:w1"]
    );

    assert!(registry.unsubscribe(id));
    register(&registry, "w2", FnAgent::succeeding());
    assert_eq!(seen.lock().len(), 4);
}
