//! Subcommand implementations.

pub mod agent;
pub mod config;
pub mod health;
pub mod job;
pub mod scheduler;

use anyhow::{bail, Result};
use serde_json::{Map, Value};

/// Build a JSON object from `key=value` assignments.
///
/// Values are parsed as JSON when possible (`5000`, `true`, `["a"]`) and kept
/// as strings otherwise. Dotted keys nest: `retryPolicy.maxAttempts=5`.
pub fn parse_assignments(pairs: &[String]) -> Result<Value> {
    let mut root = Map::new();

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("expected key=value, got '{}'", pair);
        };
        let key = key.trim();
        if key.is_empty() || key.split('.').any(str::is_empty) {
            bail!("invalid key in '{}'", pair);
        }

        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let mut segments: Vec<&str> = key.split('.').collect();
        let Some(leaf) = segments.pop() else {
            bail!("invalid key in '{}'", pair);
        };

        let mut target = &mut root;
        for segment in segments {
            let entry = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            target = match entry {
                Value::Object(map) => map,
                _ => bail!("'{}' is already set to a non-object value", segment),
            };
        }
        target.insert(leaf.to_string(), value);
    }

    Ok(Value::Object(root))
}
