//! Agent management commands.
//!
//! Provides list, show, health, metrics, configuration and lifecycle control
//! for agents.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::Tabled;

use super::parse_assignments;
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

const AGENTS_PATH: &str = "/api/v1/agents";

#[derive(Subcommand)]
pub enum AgentCommands {
    /// List registered agents
    List,

    /// Show fleet health with one line per agent
    Health,

    /// Show execution totals across all agents
    Metrics,

    /// Show one agent's configuration, health and metrics
    Show {
        /// Agent ID
        agent_id: String,
    },

    /// Start an agent
    Start {
        /// Agent ID
        agent_id: String,
    },

    /// Stop an agent
    Stop {
        /// Agent ID
        agent_id: String,
    },

    /// Stop then start an agent
    Restart {
        /// Agent ID
        agent_id: String,
    },

    /// Change an agent's configuration
    Configure {
        /// Agent ID
        agent_id: String,

        /// Field assignment, e.g. `scheduleIntervalMs=60000` or `retryPolicy.maxAttempts=5`
        #[arg(short, long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentInfo {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    version: String,
    state: String,
    config: Value,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigChange {
    config: Value,
    schedule_changed: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct AgentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Interval")]
    interval: String,
    #[tabled(rename = "Version")]
    version: String,
}

impl From<&AgentInfo> for AgentRow {
    fn from(agent: &AgentInfo) -> Self {
        let enabled = agent.config.get("enabled").and_then(Value::as_bool);
        let interval = agent.config.get("scheduleIntervalMs").and_then(Value::as_u64);
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            state: output::colorize_status(&agent.state),
            enabled: enabled.map(|e| e.to_string()).unwrap_or_else(|| "?".into()),
            interval: interval.map(output::format_millis).unwrap_or_else(|| "?".into()),
            version: agent.version.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentHealth {
    status: String,
    health_percentage: f64,
    uptime_secs: u64,
    #[serde(default)]
    issues: Vec<HealthIssue>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthIssue {
    severity: String,
    code: String,
    message: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentMetrics {
    total_executions: u64,
    successful_executions: u64,
    failed_executions: u64,
    average_execution_time_ms: f64,
}

#[derive(Debug, Deserialize, Serialize)]
struct AgentDetail {
    #[serde(flatten)]
    info: AgentInfo,
    health: AgentHealth,
    metrics: AgentMetrics,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentReport {
    id: String,
    name: String,
    state: String,
    health: AgentHealth,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemHealth {
    status: String,
    total_agents: usize,
    running_agents: usize,
    error_agents: usize,
    agents: Vec<AgentReport>,
}

#[derive(Debug, Serialize, Tabled)]
struct HealthRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Health")]
    status: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Issues")]
    issues: usize,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemMetrics {
    total_agents: usize,
    total_executions: u64,
    successful_executions: u64,
    failed_executions: u64,
    average_execution_time_ms: f64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RestartResult {
    agent: AgentInfo,
    restart: RestartReport,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RestartReport {
    stop_error: Option<String>,
}

pub async fn execute(cmd: AgentCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        AgentCommands::List => {
            let agents: Vec<AgentInfo> = client.get(AGENTS_PATH).await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<AgentRow> = agents.iter().map(AgentRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&agents, format)?,
            }
        }

        AgentCommands::Health => {
            let health: SystemHealth = client.get(&format!("{}/health", AGENTS_PATH)).await?;
            match format {
                OutputFormat::Table => {
                    output::print_header("Agent Fleet");
                    output::print_detail("Status", &output::colorize_status(&health.status));
                    output::print_detail(
                        "Agents",
                        &format!(
                            "{} total, {} running, {} in error",
                            health.total_agents, health.running_agents, health.error_agents
                        ),
                    );
                    println!();
                    let rows: Vec<HealthRow> = health
                        .agents
                        .iter()
                        .map(|a| HealthRow {
                            id: a.id.clone(),
                            state: output::colorize_status(&a.state),
                            status: output::colorize_status(&a.health.status),
                            score: format!("{:.0}%", a.health.health_percentage),
                            issues: a.health.issues.len(),
                        })
                        .collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&health, format)?,
            }
        }

        AgentCommands::Metrics => {
            let metrics: SystemMetrics = client.get(&format!("{}/metrics", AGENTS_PATH)).await?;
            match format {
                OutputFormat::Table => {
                    output::print_header("Agent Metrics");
                    output::print_detail("Agents", &metrics.total_agents.to_string());
                    output::print_detail("Executions", &metrics.total_executions.to_string());
                    output::print_detail("Succeeded", &metrics.successful_executions.to_string());
                    output::print_detail("Failed", &metrics.failed_executions.to_string());
                    output::print_detail(
                        "Avg time",
                        &format!("{:.1}ms", metrics.average_execution_time_ms),
                    );
                }
                _ => output::print_item(&metrics, format)?,
            }
        }

        AgentCommands::Show { agent_id } => {
            let detail: AgentDetail = client.get(&format!("{}/{}", AGENTS_PATH, agent_id)).await?;
            match format {
                OutputFormat::Table => print_detail(&detail)?,
                _ => output::print_item(&detail, format)?,
            }
        }

        AgentCommands::Start { agent_id } => {
            let agent: AgentInfo = client
                .post(&format!("{}/{}/start", AGENTS_PATH, agent_id), &json!({}))
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Agent '{}' is {}", agent.id, agent.state))
                }
                _ => output::print_item(&agent, format)?,
            }
        }

        AgentCommands::Stop { agent_id } => {
            let agent: AgentInfo = client
                .post(&format!("{}/{}/stop", AGENTS_PATH, agent_id), &json!({}))
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Agent '{}' is {}", agent.id, agent.state))
                }
                _ => output::print_item(&agent, format)?,
            }
        }

        AgentCommands::Restart { agent_id } => {
            let result: RestartResult = client
                .post(&format!("{}/{}/restart", AGENTS_PATH, agent_id), &json!({}))
                .await?;
            match format {
                OutputFormat::Table => {
                    if let Some(error) = &result.restart.stop_error {
                        output::print_warning(&format!("Stop failed and was skipped: {}", error));
                    }
                    output::print_success(&format!(
                        "Agent '{}' restarted ({})",
                        result.agent.id, result.agent.state
                    ));
                }
                _ => output::print_item(&result, format)?,
            }
        }

        AgentCommands::Configure { agent_id, set } => {
            let patch = parse_assignments(&set)?;
            let change: ConfigChange = client
                .post(&format!("{}/{}/configure", AGENTS_PATH, agent_id), &patch)
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Agent '{}' reconfigured", agent_id));
                    if change.schedule_changed {
                        output::print_info("Recurring timer rescheduled");
                    }
                    output::print_item(&change.config, format)?;
                }
                _ => output::print_item(&change, format)?,
            }
        }
    }

    Ok(())
}

fn print_detail(detail: &AgentDetail) -> Result<()> {
    let info = &detail.info;
    output::print_header(&format!("Agent: {}", info.name));
    output::print_detail("ID", &info.id);
    if !info.description.is_empty() {
        output::print_detail("Description", &info.description);
    }
    output::print_detail("Version", &info.version);
    output::print_detail("State", &output::colorize_status(&info.state));

    let health = &detail.health;
    output::print_header("Health");
    output::print_detail("Status", &output::colorize_status(&health.status));
    output::print_detail("Score", &format!("{:.0}%", health.health_percentage));
    output::print_detail("Uptime", &format!("{}s", health.uptime_secs));
    for issue in &health.issues {
        output::print_detail(
            &format!("[{}] {}", issue.severity, issue.code),
            &issue.message,
        );
    }

    let metrics = &detail.metrics;
    output::print_header("Metrics");
    output::print_detail("Executions", &metrics.total_executions.to_string());
    output::print_detail("Succeeded", &metrics.successful_executions.to_string());
    output::print_detail("Failed", &metrics.failed_executions.to_string());
    output::print_detail("Avg time", &format!("{:.1}ms", metrics.average_execution_time_ms));

    output::print_header("Configuration");
    output::print_item(&info.config, OutputFormat::Json)
}
