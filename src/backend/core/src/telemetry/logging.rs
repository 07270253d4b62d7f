//! Structured logging setup.
//!
//! JSON output for deployed environments, pretty output for development,
//! per-module levels on top of a global `EnvFilter` directive.

use serde::Deserialize;
use std::collections::HashMap;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` expression)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels, e.g. `steward_core::jobs = "debug"`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default = "default_true")]
    pub include_location: bool,

    #[serde(default)]
    pub include_thread: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_true")]
    pub include_target: bool,

    /// e.g. `["new", "close"]`
    #[serde(default = "default_span_events")]
    pub span_events: Vec<SpanEvent>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: true,
            include_thread: false,
            include_target: true,
            span_events: default_span_events(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    /// Single-line human-readable output
    Compact,
}

/// Span lifecycle event that produces a log line.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpanEvent {
    New,
    Enter,
    Exit,
    Close,
}

fn span_events(events: &[SpanEvent]) -> FmtSpan {
    events.iter().fold(FmtSpan::NONE, |acc, event| {
        acc | match event {
            SpanEvent::New => FmtSpan::NEW,
            SpanEvent::Enter => FmtSpan::ENTER,
            SpanEvent::Exit => FmtSpan::EXIT,
            SpanEvent::Close => FmtSpan::CLOSE,
        }
    })
}

fn default_span_events() -> Vec<SpanEvent> {
    // Close events carry busy/idle timings.
    vec![SpanEvent::Close]
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_true() -> bool {
    true
}

/// Build the filter from the global level plus per-module overrides.
pub fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

/// The format actually used: development swaps the JSON default for pretty.
pub fn effective_format(config: &LoggingConfig, environment: &str) -> LogFormat {
    if environment == "development" && config.format == LogFormat::Json {
        LogFormat::Pretty
    } else {
        config.format
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Fails on an unparsable filter directive or when a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    macro_rules! layer {
        ($format:ident) => {
            fmt::layer()
                .$format()
                .with_span_events(span_events(&config.span_events))
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread)
                .with_thread_names(config.include_thread)
                .with_target(config.include_target)
        };
    }

    match effective_format(config, environment) {
        LogFormat::Json => registry.with(layer!(json)).try_init()?,
        LogFormat::Pretty => registry.with(layer!(pretty)).try_init()?,
        LogFormat::Compact => registry.with(layer!(compact)).try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_prefers_pretty() {
        let config = LoggingConfig::default();
        assert_eq!(effective_format(&config, "development"), LogFormat::Pretty);
        assert_eq!(effective_format(&config, "production"), LogFormat::Json);

        let compact = LoggingConfig {
            format: LogFormat::Compact,
            ..Default::default()
        };
        assert_eq!(effective_format(&compact, "development"), LogFormat::Compact);
    }

    #[test]
    fn test_module_levels_parse() {
        let mut config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        config
            .module_levels
            .insert("steward_core::jobs".to_string(), "debug".to_string());
        assert!(build_filter(&config).is_ok());

        config
            .module_levels
            .insert("steward_core".to_string(), "[not a level".to_string());
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_span_events_from_config() {
        let config: LoggingConfig =
            serde_json::from_value(serde_json::json!({ "span_events": ["new", "close"] })).unwrap();
        assert_eq!(span_events(&config.span_events), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(span_events(&LoggingConfig::default().span_events), FmtSpan::CLOSE);
    }
}
