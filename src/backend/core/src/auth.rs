//! Authorization gate for agent control operations.
//!
//! System-owned agents (lead scoring, inventory pricing, chat answering) may
//! only be controlled by the platform itself. Any tenant-sourced control
//! operation against them is denied; everything else is allowed.
//!
//! The gate is stateless. Callers must consult it on every mutating call,
//! before touching any state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Agents that tenants can never schedule, configure, start, stop or remove.
pub const SYSTEM_PROTECTED_AGENTS: &[&str] = &["leads-agent", "inventory-agent", "chat-agent"];

/// Protection level reported to clients for system-owned agents.
pub const PROTECTION_LEVEL_SYSTEM: &str = "system";

/// Who is asking for the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallSource {
    /// The platform itself (recurring driver, internal maintenance).
    System,
    /// A tenant-facing API caller.
    Tenant,
}

impl fmt::Display for CallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Tenant => write!(f, "tenant"),
        }
    }
}

/// Control operations subject to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlOperation {
    Schedule,
    Configure,
    Start,
    Stop,
    Remove,
}

impl ControlOperation {
    pub const ALL: [ControlOperation; 5] = [
        Self::Schedule,
        Self::Configure,
        Self::Start,
        Self::Stop,
        Self::Remove,
    ];
}

impl fmt::Display for ControlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::Configure => write!(f, "configure"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// The operation may proceed.
    Allow,
    /// The operation is denied, with a human-readable reason.
    Deny(String),
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason),
        }
    }
}

/// Whether an agent id is on the system protection list.
pub fn is_system_protected(agent_id: &str) -> bool {
    SYSTEM_PROTECTED_AGENTS.contains(&agent_id)
}

/// Decide whether `source` may perform `operation` on `agent_id`.
pub fn authorize(
    agent_id: &str,
    operation: ControlOperation,
    source: CallSource,
) -> AuthorizationDecision {
    if source == CallSource::Tenant && is_system_protected(agent_id) {
        debug!(
            agent_id = %agent_id,
            operation = %operation,
            "Tenant operation on system agent denied"
        );
        return AuthorizationDecision::Deny(format!(
            "Cannot {} agent '{}': it is a system-managed agent and cannot be controlled by tenants",
            operation, agent_id
        ));
    }

    AuthorizationDecision::Allow
}

/// Like [`authorize`], but converted into the crate error on denial.
pub fn ensure_authorized(
    agent_id: &str,
    operation: ControlOperation,
    source: CallSource,
) -> crate::error::Result<()> {
    match authorize(agent_id, operation, source) {
        AuthorizationDecision::Allow => Ok(()),
        AuthorizationDecision::Deny(reason) => Err(crate::error::StewardError::agent_protected(
            agent_id, operation, reason,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_denied_on_every_protected_agent() {
        for agent_id in SYSTEM_PROTECTED_AGENTS {
            for op in ControlOperation::ALL {
                let decision = authorize(agent_id, op, CallSource::Tenant);
                assert!(decision.is_denied(), "{} {} should be denied", op, agent_id);

                let reason = decision.reason().unwrap();
                assert!(reason.contains(agent_id));
                assert!(reason.contains(&op.to_string()));
                assert!(reason.contains("system-managed"));
            }
        }
    }

    #[test]
    fn test_system_source_always_allowed() {
        for agent_id in SYSTEM_PROTECTED_AGENTS {
            for op in ControlOperation::ALL {
                assert!(authorize(agent_id, op, CallSource::System).is_allowed());
            }
        }
    }

    #[test]
    fn test_unprotected_agents_allowed_for_tenants() {
        for agent_id in ["w1", "followup-agent", "LEADS-AGENT", ""] {
            for op in ControlOperation::ALL {
                assert!(authorize(agent_id, op, CallSource::Tenant).is_allowed());
            }
        }
    }

    #[test]
    fn test_ensure_authorized_maps_to_forbidden() {
        let err = ensure_authorized("chat-agent", ControlOperation::Stop, CallSource::Tenant)
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::AgentProtected);
        assert_eq!(err.context()["protectionLevel"], "system");
        assert_eq!(err.context()["agentId"], "chat-agent");
    }
}
