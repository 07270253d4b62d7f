//! Health check command.
//!
//! Queries the `/health` endpoint (or one of the probes) and displays
//! component status.

use anyhow::{bail, Result};
use clap::Args;
use serde_json::Value;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include detailed component checks
    #[arg(short, long)]
    detailed: bool,

    /// Query the readiness probe only
    #[arg(long, conflicts_with = "live")]
    ready: bool,

    /// Query the liveness probe only
    #[arg(long)]
    live: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    if args.live || args.ready {
        return probe(&args, client, format).await;
    }

    let health: Value = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            let status = str_field(&health, "status");

            output::print_header("System Health");
            output::print_detail("Status", &output::colorize_status(status));
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(Value::as_str) {
                output::print_detail("Version", version);
            }
            if let Some(uptime) = health.get("uptimeSecs").and_then(Value::as_u64) {
                output::print_detail("Uptime", &output::format_millis(uptime * 1_000));
            }
            if let Some(ts) = health.get("timestamp").and_then(Value::as_str) {
                output::print_detail("Timestamp", ts);
            }

            if args.detailed {
                if let Some(components) = health.get("components").and_then(Value::as_array) {
                    output::print_header("Components");
                    for comp in components {
                        let mut line = output::colorize_status(str_field(comp, "status"));
                        if let Some(latency) = comp.get("latencyMs").and_then(Value::as_u64) {
                            line.push_str(&format!(" ({}ms)", latency));
                        }
                        if let Some(message) = comp
                            .get("message")
                            .or_else(|| comp.get("error"))
                            .and_then(Value::as_str)
                        {
                            line.push_str(&format!(" - {}", message));
                        }
                        output::print_detail(str_field(comp, "name"), &line);
                    }
                }
            }

            match status {
                "healthy" => output::print_success("All systems operational"),
                "degraded" => output::print_warning("System is degraded"),
                _ => bail!("System status: {}", status),
            }
        }
        _ => output::print_item(&health, format)?,
    }

    Ok(())
}

async fn probe(args: &HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (path, field, label) = if args.live {
        ("/health/live", "alive", "alive")
    } else {
        ("/health/ready", "ready", "ready")
    };
    let body: Value = client.get_raw(path).await?;

    if format != OutputFormat::Table {
        return output::print_item(&body, format);
    }

    if body.get(field).and_then(Value::as_bool) == Some(true) {
        output::print_success(&format!("Service is {}", label));
        return Ok(());
    }

    let mut reason = body
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("no reason given")
        .to_string();
    if let Some(components) = body.get("unreadyComponents").and_then(Value::as_array) {
        let names: Vec<&str> = components.iter().filter_map(Value::as_str).collect();
        if !names.is_empty() {
            reason.push_str(&format!(" ({})", names.join(", ")));
        }
    }
    bail!("Service is not {}: {}", label, reason)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("unknown")
}
