#![allow(clippy::result_large_err)]
//! # Steward Core
//!
//! Lifecycle management and job scheduling for long-lived background agents.
//!
//! ## Architecture
//!
//! - **Agents**: lifecycle state machine, health scoring and the registry
//! - **Jobs**: job store, executor with a global concurrency cap, retries and
//!   timeouts, the recurring driver and the scheduler facade
//! - **Auth**: the gate that keeps tenants away from system-owned agents
//! - **Health**: component checkers and liveness/readiness probes
//! - **Telemetry**: structured logging and Prometheus metrics
//! - **API**: the axum HTTP surface

pub mod agents;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod jobs;
pub mod telemetry;
pub mod ticker;

pub use error::{ErrorCode, ErrorResponse, ErrorSeverity, Result, StewardError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agents::{
        Agent, AgentBehavior, AgentConfig, AgentConfigPatch, AgentDescriptor, AgentRegistry,
        AgentState, FnAgent,
    };
    pub use crate::auth::{authorize, AuthorizationDecision, CallSource, ControlOperation};
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::context::CoreContext;
    pub use crate::error::{ErrorCode, Result, StewardError};
    pub use crate::jobs::{Job, JobId, JobKind, JobState, ScheduleConfig, Scheduler};
}
