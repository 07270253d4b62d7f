//! Job commands: schedule work for an agent and inspect the job table.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

const SCHEDULER_PATH: &str = "/api/v1/scheduler";

#[derive(Subcommand)]
pub enum JobCommands {
    /// List every job recorded for an agent
    List {
        /// Agent ID
        agent_id: String,

        /// Only show jobs in this status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show a single job
    Get {
        /// Job ID
        job_id: String,
    },

    /// Schedule a job for an agent
    Schedule {
        /// Agent ID
        agent_id: String,

        /// Job type
        #[arg(short = 't', long = "type", value_enum, default_value_t = JobKind::Scheduled)]
        kind: JobKind,

        /// Delay before the job becomes due (ignored for immediate jobs)
        #[arg(short, long, default_value_t = 0)]
        delay_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobKind {
    Immediate,
    Scheduled,
    Background,
}

impl JobKind {
    fn as_str(self) -> &'static str {
        match self {
            JobKind::Immediate => "immediate",
            JobKind::Scheduled => "scheduled",
            JobKind::Background => "background",
        }
    }
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    id: String,
    agent_id: String,
    #[serde(rename = "type")]
    kind: String,
    status: String,
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    error: Option<String>,
    retry_count: u32,
    max_retries: u32,
    source: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: String,
    #[tabled(rename = "Due")]
    scheduled_at: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            kind: job.kind.clone(),
            status: output::colorize_status(&job.status),
            attempts: format!("{}/{}", job.retry_count, job.max_retries),
            scheduled_at: format_time(&job.scheduled_at),
            error: job.error.clone().unwrap_or_default(),
        }
    }
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub async fn execute(cmd: JobCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        JobCommands::List { agent_id, status } => {
            let mut jobs: Vec<Job> = client
                .get(&format!("{}?action=jobs&agentId={}", SCHEDULER_PATH, agent_id))
                .await?;
            if let Some(status) = &status {
                jobs.retain(|job| job.status.eq_ignore_ascii_case(status));
            }

            match format {
                OutputFormat::Table => {
                    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&jobs, format)?,
            }
        }

        JobCommands::Get { job_id } => {
            let job: Job = client
                .get(&format!("{}?action=job&jobId={}", SCHEDULER_PATH, job_id))
                .await?;
            match format {
                OutputFormat::Table => print_job(&job),
                _ => output::print_item(&job, format)?,
            }
        }

        JobCommands::Schedule {
            agent_id,
            kind,
            delay_ms,
        } => {
            let body = json!({
                "agentId": agent_id,
                "type": kind.as_str(),
                "delay": delay_ms,
            });
            let job: Job = client
                .post(&format!("{}?action=schedule", SCHEDULER_PATH), &body)
                .await?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Job {} scheduled for '{}'", job.id, job.agent_id));
                    print_job(&job);
                }
                _ => output::print_item(&job, format)?,
            }
        }
    }

    Ok(())
}

fn print_job(job: &Job) {
    output::print_header(&format!("Job {}", job.id));
    output::print_detail("Agent", &job.agent_id);
    output::print_detail("Type", &job.kind);
    output::print_detail("Status", &output::colorize_status(&job.status));
    output::print_detail("Source", &job.source);
    output::print_detail("Attempts", &format!("{}/{}", job.retry_count, job.max_retries));
    output::print_detail("Created", &format_time(&job.created_at));
    output::print_detail("Due", &format_time(&job.scheduled_at));
    if let Some(at) = &job.started_at {
        output::print_detail("Started", &format_time(at));
    }
    if let Some(at) = &job.completed_at {
        output::print_detail("Completed", &format_time(at));
    }
    if let Some(error) = &job.error {
        output::print_detail("Error", error);
    }
    if let Some(result) = &job.result {
        output::print_detail("Result", &result.to_string());
    }
}
