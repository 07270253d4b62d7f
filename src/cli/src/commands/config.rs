//! Configuration management commands.
//!
//! Stores CLI defaults in `~/.steward/config.toml`.

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (api-url or output)
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show all configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Persistent CLI defaults.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputFormat>,
}

impl CliConfig {
    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api-url" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    bail!("api-url must start with http:// or https://");
                }
                self.api_url = Some(value.trim_end_matches('/').to_string());
            }
            "output" => {
                let format = OutputFormat::from_str(value, true)
                    .map_err(|_| anyhow::anyhow!("output must be one of: table, json, yaml"))?;
                self.output = Some(format);
            }
            _ => bail!("Unknown key '{}' (expected api-url or output)", key),
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(match key {
            "api-url" => self.api_url.clone(),
            "output" => self
                .output
                .and_then(|f| f.to_possible_value())
                .map(|v| v.get_name().to_string()),
            _ => bail!("Unknown key '{}' (expected api-url or output)", key),
        })
    }
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".steward").join("config.toml"))
}

/// Missing file means defaults.
fn load_config() -> Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_config(cfg: &CliConfig) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn load_api_url() -> Option<String> {
    load_config().ok().and_then(|cfg| cfg.api_url)
}

pub fn load_output_format() -> Option<OutputFormat> {
    load_config().ok().and_then(|cfg| cfg.output)
}

pub fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut cfg = load_config()?;
            cfg.set(&key, &value)?;
            save_config(&cfg)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, value)),
                _ => output::print_item(&cfg, format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let Some(value) = load_config()?.get(&key)? else {
                bail!("'{}' is not set", key);
            };
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ key: value }), format)?,
            }
        }

        ConfigCommands::Show => {
            let cfg = load_config()?;
            if cfg == CliConfig::default() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for key in ["api-url", "output"] {
                        if let Some(value) = cfg.get(key)? {
                            output::print_detail(key, &value);
                        }
                    }
                }
                _ => output::print_item(&cfg, format)?,
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This will reset all CLI configuration. Use --force to confirm.");
                return Ok(());
            }

            let path = config_path()?;
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            output::print_success("Configuration reset to defaults");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_validates_values() {
        let mut cfg = CliConfig::default();
        cfg.set("api-url", "http://steward:9000/").unwrap();
        cfg.set("output", "YAML").unwrap();
        assert_eq!(cfg.api_url.as_deref(), Some("http://steward:9000"));
        assert_eq!(cfg.output, Some(OutputFormat::Yaml));

        assert!(cfg.set("api-url", "steward:9000").is_err());
        assert!(cfg.set("output", "xml").is_err());
        assert!(cfg.set("color", "never").is_err());
    }

    #[test]
    fn test_toml_layout() {
        let cfg = CliConfig {
            api_url: Some("http://steward:9000".into()),
            output: Some(OutputFormat::Json),
        };
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("api-url = \"http://steward:9000\""));
        assert!(text.contains("output = \"json\""));

        let parsed: CliConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.get("output").unwrap().as_deref(), Some("json"));
    }
}
