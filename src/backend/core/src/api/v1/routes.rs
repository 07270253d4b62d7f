//! V1 API routes.

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::{handlers, AppState};

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

/// Build the V1 API router.
///
/// All routes are mounted under `/api/v1/`.
///
/// # Endpoints
///
/// ## Scheduler
/// - `GET /api/v1/scheduler?action=status|jobs|job`
/// - `POST /api/v1/scheduler?action=start|stop|schedule|configure|cleanup`
/// - `DELETE /api/v1/scheduler?action=cleanup`
///
/// ## Agents
/// - `GET /api/v1/agents` - List all agents
/// - `GET /api/v1/agents/health` - System health rollup
/// - `GET /api/v1/agents/metrics` - Aggregated execution metrics
/// - `GET /api/v1/agents/:id` - Agent with health and metrics
/// - `POST /api/v1/agents/:id/start|stop|restart` - Lifecycle control
/// - `POST /api/v1/agents/:id/configure` - Merge an agent config patch
pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route(
            "/scheduler",
            get(handlers::scheduler_get)
                .post(handlers::scheduler_post)
                .delete(handlers::scheduler_delete),
        )
        .route("/agents", get(handlers::list_agents))
        .route("/agents/health", get(handlers::agents_health))
        .route("/agents/metrics", get(handlers::agents_metrics))
        .route("/agents/:id", get(handlers::get_agent))
        .route("/agents/:id/start", post(handlers::start_agent))
        .route("/agents/:id/stop", post(handlers::stop_agent))
        .route("/agents/:id/restart", post(handlers::restart_agent))
        .route("/agents/:id/configure", post(handlers::configure_agent))
}

/// V1 API route constants for use in clients and documentation.
pub mod paths {
    pub const SCHEDULER: &str = "/api/v1/scheduler";

    pub const AGENTS: &str = "/api/v1/agents";
    pub const AGENTS_HEALTH: &str = "/api/v1/agents/health";
    pub const AGENTS_METRICS: &str = "/api/v1/agents/metrics";
    pub const AGENT: &str = "/api/v1/agents/:id";
    pub const AGENT_START: &str = "/api/v1/agents/:id/start";
    pub const AGENT_STOP: &str = "/api/v1/agents/:id/stop";
    pub const AGENT_RESTART: &str = "/api/v1/agents/:id/restart";
    pub const AGENT_CONFIGURE: &str = "/api/v1/agents/:id/configure";

    /// Substitute `:id` in an agent path.
    pub fn agent(template: &str, id: &str) -> String {
        template.replace(":id", id)
    }
}
