//! Steward Server - Main entry point
//!
//! Hosts the agent registry and job scheduler behind the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use steward_core::{
    api::{self, AppState},
    config::Config,
    context::CoreContext,
    health::{AgentsHealthChecker, HealthService, SchedulerHealthChecker},
    jobs::{JobJanitor, Scheduler},
    telemetry::{init_telemetry, TelemetryConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    let telemetry = init_telemetry(&TelemetryConfig::from(&config.observability))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.observability.environment,
        "Starting Steward Server"
    );

    // Core state
    let ctx = CoreContext::system();
    let settings = &config.scheduler;
    let scheduler = Arc::new(Scheduler::new(ctx.clone(), settings.schedule_config())?);

    let janitor = JobJanitor::new(ctx.jobs.clone(), ctx.clock.clone(), settings.cleanup_max_age)
        .into_agent(settings.cleanup_interval)
        .with_self_check_interval(settings.self_check_interval);
    scheduler.register_agent(janitor)?;

    let outcome = ctx.registry.start_all().await;
    for failure in &outcome.failed {
        tracing::warn!(agent_id = %failure.agent_id, error = %failure.error, "Agent failed to start");
    }

    if settings.autostart {
        scheduler.start();
    }

    // Health
    let health = HealthService::new(&config.health)
        .with_checker(Arc::new(AgentsHealthChecker::new(ctx.registry.clone())))
        .with_checker(Arc::new(SchedulerHealthChecker::new(
            scheduler.clone(),
            config.health.saturation_threshold_pct,
        )));

    let app_state = AppState {
        scheduler: scheduler.clone(),
        health: Arc::new(health),
        metrics: telemetry.metrics.clone(),
    };

    let app = api::build_router(app_state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    scheduler.shutdown().await;
    let stopped = ctx.registry.stop_all().await;
    tracing::info!(
        stopped = stopped.succeeded.len(),
        failed = stopped.failed.len(),
        "Server shutdown complete"
    );

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
