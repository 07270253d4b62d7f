//! Steward CLI - Command-line interface for the Steward agent scheduler.
//!
//! Provides commands for scheduler, job, agent, health, and configuration management.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{agent, config, health, job, scheduler};
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Steward - Agent Lifecycle and Job Scheduling CLI
#[derive(Parser)]
#[command(
    name = "steward",
    version,
    about = "Steward - Agent Lifecycle and Job Scheduling",
    long_about = "CLI tool for managing Steward agents, jobs and the scheduler.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format (defaults to the `output` config value, then table)
    #[arg(short, long, global = true)]
    output: Option<OutputFormat>,

    /// API server URL
    #[arg(long, global = true, env = "STEWARD_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scheduler control and configuration
    #[command(subcommand)]
    Scheduler(scheduler::SchedulerCommands),

    /// Job scheduling and inspection
    #[command(subcommand)]
    Job(job::JobCommands),

    /// Agent management operations
    #[command(subcommand)]
    Agent(agent::AgentCommands),

    /// Check system health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli
        .output
        .or_else(config::load_output_format)
        .unwrap_or_default();

    let api_url = cli.api_url;
    let result = match cli.command {
        Commands::Config(cmd) => config::execute(cmd, format),
        Commands::Scheduler(cmd) => scheduler::execute(cmd, &connect(api_url)?, format).await,
        Commands::Job(cmd) => job::execute(cmd, &connect(api_url)?, format).await,
        Commands::Agent(cmd) => agent::execute(cmd, &connect(api_url)?, format).await,
        Commands::Health(args) => health::execute(args, &connect(api_url)?, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

/// Build a client from the flag/env value, then the config file, then the default.
fn connect(api_url: Option<String>) -> Result<client::ApiClient> {
    let api_url = api_url
        .or_else(config::load_api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    client::ApiClient::new(&api_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_schedule_defaults() {
        let cli = Cli::try_parse_from(["steward", "job", "schedule", "w1"]).unwrap();
        match cli.command {
            Commands::Job(job::JobCommands::Schedule { agent_id, kind, delay_ms }) => {
                assert_eq!(agent_id, "w1");
                assert_eq!(kind, job::JobKind::Scheduled);
                assert_eq!(delay_ms, 0);
            }
            _ => panic!("expected job schedule"),
        }
    }

    #[test]
    fn test_configure_requires_assignment() {
        assert!(Cli::try_parse_from(["steward", "scheduler", "configure"]).is_err());
        assert!(Cli::try_parse_from([
            "steward", "scheduler", "configure", "--agent", "w1", "--set", "enabled=false",
        ])
        .is_ok());
    }

    #[test]
    fn test_agent_configure_parses_assignments() {
        assert!(Cli::try_parse_from(["steward", "agent", "configure", "w1"]).is_err());
        let cli = Cli::try_parse_from([
            "steward", "agent", "configure", "w1", "-s", "scheduleIntervalMs=60000", "-s", "enabled=false",
        ])
        .unwrap();
        match cli.command {
            Commands::Agent(agent::AgentCommands::Configure { agent_id, set }) => {
                assert_eq!(agent_id, "w1");
                assert_eq!(set.len(), 2);
            }
            _ => panic!("expected agent configure"),
        }
    }

    #[test]
    fn test_health_probe_flags_conflict() {
        assert!(Cli::try_parse_from(["steward", "health", "--live", "--ready"]).is_err());
    }
}
