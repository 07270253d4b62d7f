//! API request handlers.
//!
//! Handlers return `Result<impl IntoResponse, StewardError>`; errors turn
//! into responses through the `IntoResponse` impl on `StewardError`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::{ApiResponse, AppState};
use crate::agents::{AgentConfigPatch, AgentHealth, AgentInfo, AgentMetrics};
use crate::auth::{ensure_authorized, CallSource, ControlOperation};
use crate::error::{Result, StewardError};
use crate::jobs::{JobId, JobKind, ScheduleConfigPatch};

/// Retention used by `cleanup` when the request gives no `maxAge`.
pub const DEFAULT_CLEANUP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// HTTP callers act with tenant rights.
const SOURCE: CallSource = CallSource::Tenant;

// ═══════════════════════════════════════════════════════════════════════════════
// Request Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerQuery {
    pub action: Option<String>,
    pub agent_id: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub agent_id: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: JobKind,
    /// Milliseconds from now
    #[serde(default)]
    pub delay: i64,
}

fn default_kind() -> JobKind {
    JobKind::Scheduled
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    #[serde(default)]
    pub config: serde_json::Value,
    pub agent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    /// Milliseconds
    pub max_age: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStateResponse {
    pub running: bool,
    /// Whether this call changed the run state
    pub changed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub removed: usize,
    pub max_age_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetail {
    #[serde(flatten)]
    pub info: AgentInfo,
    pub health: AgentHealth,
    pub metrics: AgentMetrics,
}

/// Parse an optional JSON body; an empty body yields the default value.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| StewardError::validation(format!("Invalid request body: {}", e)))
}

fn parse_required<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| StewardError::validation(format!("Invalid request body: {}", e)))
}

fn millis(field: &str, value: i64) -> Result<Duration> {
    u64::try_from(value)
        .map(Duration::from_millis)
        .map_err(|_| StewardError::validation(format!("{} must not be negative", field)))
}

fn require_action(query: &SchedulerQuery) -> Result<&str> {
    query
        .action
        .as_deref()
        .ok_or_else(|| StewardError::missing_field("action"))
}

fn unknown_action(action: &str) -> StewardError {
    StewardError::validation(format!("Unknown action: {}", action))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════════

/// GET /api/v1/scheduler?action=status|jobs|job
pub async fn scheduler_get(
    State(state): State<AppState>,
    Query(query): Query<SchedulerQuery>,
) -> Result<impl IntoResponse> {
    let scheduler = &state.scheduler;

    let data = match require_action(&query)? {
        "status" => serde_json::to_value(scheduler.status())?,
        "jobs" => {
            let agent_id = query
                .agent_id
                .as_deref()
                .ok_or_else(|| StewardError::missing_field("agentId"))?;
            serde_json::to_value(scheduler.jobs_for_agent(agent_id))?
        }
        "job" => {
            let job_id = query
                .job_id
                .as_deref()
                .ok_or_else(|| StewardError::missing_field("jobId"))?;
            serde_json::to_value(scheduler.job(&JobId::from(job_id))?)?
        }
        other => return Err(unknown_action(other)),
    };

    Ok(Json(ApiResponse::success(data)))
}

/// POST /api/v1/scheduler?action=start|stop|schedule|configure|cleanup
pub async fn scheduler_post(
    State(state): State<AppState>,
    Query(query): Query<SchedulerQuery>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let scheduler = &state.scheduler;

    let (status, data) = match require_action(&query)? {
        "start" => {
            let changed = scheduler.start();
            (StatusCode::OK, serde_json::to_value(RunStateResponse { running: true, changed })?)
        }
        "stop" => {
            let changed = scheduler.stop();
            (StatusCode::OK, serde_json::to_value(RunStateResponse { running: false, changed })?)
        }
        "schedule" => {
            let request: ScheduleRequest = parse_required(&body)?;
            let delay = millis("delay", request.delay)?;
            let job = scheduler
                .schedule_job(&request.agent_id, request.kind, delay, SOURCE)
                .await?;
            (StatusCode::CREATED, serde_json::to_value(job)?)
        }
        "configure" => {
            let request: ConfigureRequest = parse_body(&body)?;
            if let Some(agent_id) = request.agent_id.as_deref() {
                ensure_authorized(agent_id, ControlOperation::Configure, SOURCE)?;
            }
            let patch: ScheduleConfigPatch = serde_json::from_value(request.config)
                .map_err(|e| StewardError::validation(format!("Invalid schedule config: {}", e)))?;
            (StatusCode::OK, serde_json::to_value(scheduler.update_config(&patch)?)?)
        }
        "cleanup" => (StatusCode::OK, cleanup(&state, &body)?),
        other => return Err(unknown_action(other)),
    };

    Ok((status, Json(ApiResponse::success(data))))
}

/// DELETE /api/v1/scheduler?action=cleanup
pub async fn scheduler_delete(
    State(state): State<AppState>,
    Query(query): Query<SchedulerQuery>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    match require_action(&query)? {
        "cleanup" => Ok(Json(ApiResponse::success(cleanup(&state, &body)?))),
        other => Err(unknown_action(other)),
    }
}

fn cleanup(state: &AppState, body: &Bytes) -> Result<serde_json::Value> {
    let request: CleanupRequest = parse_body(body)?;
    let max_age = match request.max_age {
        Some(ms) => millis("maxAge", ms)?,
        None => DEFAULT_CLEANUP_MAX_AGE,
    };
    let removed = state.scheduler.cleanup_old_jobs(max_age);
    Ok(serde_json::to_value(CleanupResponse {
        removed,
        max_age_ms: max_age.as_millis() as u64,
    })?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Agents
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    let agents: Vec<AgentInfo> = state
        .scheduler
        .registry()
        .list()
        .iter()
        .map(|agent| agent.info())
        .collect();
    Json(ApiResponse::success(agents))
}

pub async fn agents_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.scheduler.registry().system_health()))
}

pub async fn agents_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.scheduler.registry().system_metrics()))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let agent = state.scheduler.registry().require(&id)?;
    Ok(Json(ApiResponse::success(AgentDetail {
        info: agent.info(),
        health: agent.health(),
        metrics: agent.metrics(),
    })))
}

pub async fn start_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.scheduler.start_agent(&id, SOURCE).await?;
    agent_info(&state, &id)
}

pub async fn stop_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.scheduler.stop_agent(&id, SOURCE).await?;
    agent_info(&state, &id)
}

pub async fn restart_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let report = state.scheduler.restart_agent(&id, SOURCE).await?;
    let agent = state.scheduler.registry().require(&id)?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "agent": agent.info(),
        "restart": report,
    }))))
}

/// POST /api/v1/agents/:id/configure - merge an agent config patch
pub async fn configure_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let patch: AgentConfigPatch = parse_required(&body)?;
    let change = state.scheduler.configure_agent(&id, &patch, SOURCE).await?;
    Ok(Json(ApiResponse::success(change)))
}

fn agent_info(state: &AppState, id: &str) -> Result<Json<ApiResponse<AgentInfo>>> {
    let agent = state.scheduler.registry().require(id)?;
    Ok(Json(ApiResponse::success(agent.info())))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
