//! Scheduler commands.
//!
//! Everything here goes through the `/api/v1/scheduler` action endpoint.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::parse_assignments;
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

const SCHEDULER_PATH: &str = "/api/v1/scheduler";

#[derive(Subcommand)]
pub enum SchedulerCommands {
    /// Show scheduler state, configuration and counters
    Status,

    /// Start polling and recurring timers
    Start,

    /// Stop polling and recurring timers
    Stop,

    /// Change the schedule configuration
    Configure {
        /// Agent the change is made on behalf of; protected agents are refused
        #[arg(short, long)]
        agent: Option<String>,

        /// Field assignment, e.g. `maxConcurrent=2` or `retryPolicy.maxAttempts=5`
        #[arg(short, long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },

    /// Remove finished jobs older than the given age
    Cleanup {
        /// Maximum age in milliseconds (server default: 24h)
        #[arg(long)]
        max_age_ms: Option<u64>,
    },
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchedulerStatus {
    running: bool,
    active_agents: usize,
    total_agents: usize,
    running_jobs: usize,
    pending_jobs: usize,
    total_jobs: usize,
    recurring_timers: usize,
    config: ScheduleConfig,
    stats: ExecutorStats,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleConfig {
    enabled: bool,
    poll_interval_ms: u64,
    timezone: String,
    max_concurrent: usize,
    retry_base_delay_ms: u64,
    job_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutorStats {
    scheduled: u64,
    started: u64,
    completed: u64,
    failed: u64,
    retried: u64,
    timed_out: u64,
    peak_running: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct RunState {
    running: bool,
    changed: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanupResult {
    removed: usize,
    max_age_ms: u64,
}

pub async fn execute(cmd: SchedulerCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        SchedulerCommands::Status => {
            let status: SchedulerStatus = client.get(&format!("{}?action=status", SCHEDULER_PATH)).await?;
            match format {
                OutputFormat::Table => print_status(&status),
                _ => output::print_item(&status, format)?,
            }
        }

        SchedulerCommands::Start | SchedulerCommands::Stop => {
            let (action, verb) = match cmd {
                SchedulerCommands::Start => ("start", "started"),
                _ => ("stop", "stopped"),
            };
            let state: RunState = client
                .post(&format!("{}?action={}", SCHEDULER_PATH, action), &json!({}))
                .await?;
            match format {
                OutputFormat::Table if state.changed => {
                    output::print_success(&format!("Scheduler {}", verb))
                }
                OutputFormat::Table => output::print_info(&format!("Scheduler already {}", verb)),
                _ => output::print_item(&state, format)?,
            }
        }

        SchedulerCommands::Configure { agent, set } => {
            let config = parse_assignments(&set)?;
            let mut body = json!({ "config": config });
            if let Some(agent_id) = &agent {
                body["agentId"] = Value::String(agent_id.clone());
            }

            let updated: Value = client
                .post(&format!("{}?action=configure", SCHEDULER_PATH), &body)
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_success("Schedule configuration updated");
                    output::print_item(&updated, format)?;
                }
                _ => output::print_item(&updated, format)?,
            }
        }

        SchedulerCommands::Cleanup { max_age_ms } => {
            if max_age_ms == Some(0) {
                output::print_warning("max age 0 removes every finished job");
            }
            let body = match max_age_ms {
                Some(ms) => json!({ "maxAge": ms }),
                None => json!({}),
            };
            let result: CleanupResult = client
                .delete(&format!("{}?action=cleanup", SCHEDULER_PATH), &body)
                .await?;
            match format {
                OutputFormat::Table => output::print_success(&format!(
                    "Removed {} finished job(s) older than {}",
                    result.removed,
                    output::format_millis(result.max_age_ms)
                )),
                _ => output::print_item(&result, format)?,
            }
        }
    }

    Ok(())
}

fn print_status(status: &SchedulerStatus) {
    let state = if status.running { "running" } else { "stopped" };

    output::print_header("Scheduler");
    output::print_detail("State", &output::colorize_status(state));
    output::print_detail(
        "Agents",
        &format!("{} active / {} registered", status.active_agents, status.total_agents),
    );
    output::print_detail(
        "Jobs",
        &format!(
            "{} running, {} pending, {} total",
            status.running_jobs, status.pending_jobs, status.total_jobs
        ),
    );
    output::print_detail("Recurring timers", &status.recurring_timers.to_string());

    let config = &status.config;
    output::print_header("Configuration");
    output::print_detail("Enabled", &config.enabled.to_string());
    output::print_detail("Poll interval", &output::format_millis(config.poll_interval_ms));
    output::print_detail("Max concurrent", &config.max_concurrent.to_string());
    output::print_detail("Retry base delay", &output::format_millis(config.retry_base_delay_ms));
    output::print_detail(
        "Job timeout",
        &config
            .job_timeout_ms
            .map(output::format_millis)
            .unwrap_or_else(|| "none".to_string()),
    );
    output::print_detail("Timezone", &config.timezone);

    let stats = &status.stats;
    output::print_header("Counters");
    output::print_detail("Scheduled", &stats.scheduled.to_string());
    output::print_detail("Started", &stats.started.to_string());
    output::print_detail("Completed", &stats.completed.to_string());
    output::print_detail("Failed", &stats.failed.to_string());
    output::print_detail("Retried", &stats.retried.to_string());
    output::print_detail("Timed out", &stats.timed_out.to_string());
    output::print_detail("Peak running", &stats.peak_running.to_string());
}

