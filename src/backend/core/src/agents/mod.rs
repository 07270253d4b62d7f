//! Agent definitions and management.
//!
//! - [`AgentState`]: the lifecycle graph every agent obeys
//! - [`Agent`]: identity, lifecycle, health and metrics of one agent
//! - [`AgentBehavior`]: the capability trait an agent's work is plugged in through
//! - [`AgentRegistry`]: ownership, bulk control and fleet-wide reporting

mod agent;
mod builtin;
mod config;
mod health;
mod registry;
mod state;

pub use agent::{
    Agent, AgentBehavior, AgentDescriptor, AgentInfo, AgentReport, ConfigChange, RestartReport,
    DEFAULT_SELF_CHECK_INTERVAL,
};
pub use builtin::FnAgent;
pub use config::{AgentConfig, AgentConfigPatch, RetryPolicy, RetryPolicyPatch};
pub use health::{
    health_percentage, status_for_percentage, AgentHealth, AgentMetrics, HealthIssue,
    IssueSeverity, PerformanceSnapshot, DEGRADED_THRESHOLD, HEALTHY_THRESHOLD,
};
pub use registry::{
    AgentEvent, AgentFailure, AgentRegistry, BulkOutcome, ObserverId, SystemHealth,
    SystemHealthStatus, SystemMetrics,
};
pub use state::AgentState;
