//! Error handling for Steward Core.
//!
//! One error type, [`StewardError`], carries a machine-readable [`ErrorCode`],
//! a message that is safe to hand to API clients and an optional internal
//! detail that only reaches the logs. Structured context (`agentId`,
//! `protectionLevel`, ...) is flattened into the JSON error body.
//!
//! ```rust,ignore
//! use steward_core::error::{StewardError, Result};
//!
//! fn lookup(id: &str) -> Result<()> {
//!     Err(StewardError::agent_not_found(id))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::agents::AgentState;
use crate::auth::{ControlOperation, PROTECTION_LEVEL_SYSTEM};

/// A specialized Result type for Steward operations.
pub type Result<T> = std::result::Result<T, StewardError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Registry and lifecycle
    AgentNotFound,
    DuplicateAgent,
    InvalidStateTransition,
    AgentInitializationFailed,
    AgentStartFailed,
    AgentStopFailed,

    // Jobs
    JobNotFound,

    // Authorization gate
    AgentProtected,

    // Caller input
    ValidationError,
    MissingRequiredField,
    InvalidConfiguration,

    // Process
    ConfigurationError,
    SerializationError,
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::AgentNotFound | Self::JobNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateAgent | Self::InvalidStateTransition => StatusCode::CONFLICT,
            Self::ValidationError | Self::MissingRequiredField | Self::InvalidConfiguration => {
                StatusCode::BAD_REQUEST
            }
            Self::AgentProtected => StatusCode::FORBIDDEN,
            Self::AgentInitializationFailed
            | Self::AgentStartFailed
            | Self::AgentStopFailed
            | Self::ConfigurationError
            | Self::SerializationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric and log label grouping related codes.
    pub const fn area(&self) -> &'static str {
        match self {
            Self::AgentNotFound
            | Self::DuplicateAgent
            | Self::InvalidStateTransition
            | Self::AgentInitializationFailed
            | Self::AgentStartFailed
            | Self::AgentStopFailed => "agent",
            Self::JobNotFound => "job",
            Self::AgentProtected => "authorization",
            Self::ValidationError | Self::MissingRequiredField | Self::InvalidConfiguration => {
                "request"
            }
            Self::ConfigurationError | Self::SerializationError | Self::InternalError => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How loudly an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// The caller's fault: bad input, unknown ids, protected agents
    Low,
    /// Lifecycle hooks and configuration failing
    High,
    /// Faults inside the process
    Critical,
}

impl From<ErrorCode> for ErrorSeverity {
    fn from(code: ErrorCode) -> Self {
        match code.area() {
            "internal" => Self::Critical,
            "agent" if code.http_status().is_server_error() => Self::High,
            _ => Self::Low,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Steward Core.
#[derive(Error, Debug)]
pub struct StewardError {
    code: ErrorCode,
    /// Safe to expose to clients
    user_message: Cow<'static, str>,
    /// Logged, never serialized
    internal_message: Option<String>,
    context: Map<String, Value>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for StewardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.describe())
    }
}

impl StewardError {
    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        counter!(
            "steward_errors_total",
            "code" => code.to_string(),
            "area" => code.area(),
        )
        .increment(1);

        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            context: Map::new(),
            source: None,
        }
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Missing required field: {}", field),
        )
        .with_context("field", field)
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a field that is flattened into the JSON error body.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from(self.code)
    }

    /// Message suitable for job records and logs: user message plus internal detail.
    pub fn describe(&self) -> String {
        match &self.internal_message {
            Some(internal) => format!("{}: {}", self.user_message, internal),
            None => self.user_message.to_string(),
        }
    }

    /// Log this error at a level matching its severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => error!(
                error_code = %code,
                http_status = status,
                detail = %self.describe(),
                source = ?self.source,
                "Internal error"
            ),
            ErrorSeverity::High => warn!(
                error_code = %code,
                http_status = status,
                detail = %self.describe(),
                "Request failed"
            ),
            ErrorSeverity::Low => debug!(
                error_code = %code,
                http_status = status,
                message = %self.user_message,
                "Request rejected"
            ),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body for API clients, in the same envelope as successful responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,
    pub error: String,
    pub code: ErrorCode,
    /// Structured context (e.g. `agentId`, `protectionLevel`)
    #[serde(flatten)]
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl From<&StewardError> for ErrorResponse {
    fn from(error: &StewardError) -> Self {
        Self {
            success: false,
            error: error.user_message.to_string(),
            code: error.code,
            context: error.context.clone(),
            timestamp: Utc::now(),
        }
    }
}

impl IntoResponse for StewardError {
    fn into_response(self) -> Response {
        self.log();
        (self.http_status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for StewardError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for StewardError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Failed to load configuration",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<anyhow::Error> for StewardError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<StewardError>() {
            Ok(steward_error) => steward_error,
            Err(error) => Self::internal(format!("{:#}", error)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Domain Constructors
// ═══════════════════════════════════════════════════════════════════════════════

impl StewardError {
    pub fn agent_not_found(agent_id: &str) -> Self {
        Self::new(ErrorCode::AgentNotFound, format!("Agent not found: {}", agent_id))
            .with_context("agentId", agent_id)
    }

    pub fn duplicate_agent(agent_id: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateAgent,
            format!("Agent already registered: {}", agent_id),
        )
        .with_context("agentId", agent_id)
    }

    pub fn invalid_state_transition(agent_id: &str, from: AgentState, to: AgentState) -> Self {
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Agent {} cannot move from {} to {}", agent_id, from, to),
        )
        .with_context("agentId", agent_id)
        .with_context("from", from)
        .with_context("to", to)
    }

    /// Wrap a fault raised by an agent's lifecycle hook.
    pub fn lifecycle_failed(code: ErrorCode, agent_id: &str, cause: impl fmt::Display) -> Self {
        let action = match code {
            ErrorCode::AgentInitializationFailed => "initialize",
            ErrorCode::AgentStartFailed => "start",
            ErrorCode::AgentStopFailed => "stop",
            _ => "run",
        };
        Self::with_internal(
            code,
            format!("Agent {} failed to {}", agent_id, action),
            cause.to_string(),
        )
        .with_context("agentId", agent_id)
    }

    pub fn job_not_found(job_id: &str) -> Self {
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", job_id))
            .with_context("jobId", job_id)
    }

    /// Rejection for a tenant-sourced operation on a protected agent.
    pub fn agent_protected(
        agent_id: &str,
        operation: ControlOperation,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(ErrorCode::AgentProtected, reason)
            .with_context("agentId", agent_id)
            .with_context("operation", operation)
            .with_context("protectionLevel", PROTECTION_LEVEL_SYSTEM)
    }

    /// Reject a configuration value before it is applied.
    pub fn invalid_configuration(field: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid configuration for {}: {}", field, message.into()),
        )
        .with_context("field", field)
    }
}
