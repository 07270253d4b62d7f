//! Agent lifecycle states and the transitions allowed between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an agent.
///
/// ```text
/// Uninitialized ──▶ Initializing ──▶ Running ⇄ Paused
///                        ▲   (ready)   │  ▲
///                        │             ▼  │
///                     Stopped ◀──── Maintenance
///
/// any ──▶ Error,   any (except Stopped) ──▶ Stopped
/// ```
///
/// `Initializing` doubles as the "ready" state once `initialize()` has
/// returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Uninitialized,
    Initializing,
    Running,
    Paused,
    Stopped,
    Error,
    Maintenance,
}

impl AgentState {
    /// Check whether the lifecycle graph has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;

        match (*self, next) {
            (_, Error) => true,
            (Stopped, Stopped) => false,
            (_, Stopped) => true,
            (Uninitialized | Stopped, Initializing) => true,
            (Initializing | Stopped, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Maintenance) | (Maintenance, Running) => true,
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Contribution of this state to the agent's health percentage.
    pub fn health_weight(&self) -> f64 {
        match self {
            Self::Running => 1.0,
            Self::Initializing | Self::Paused | Self::Maintenance => 0.7,
            Self::Error => 0.3,
            Self::Stopped | Self::Uninitialized => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
