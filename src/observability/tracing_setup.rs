// observability/tracing_setup.rs - Tracing Configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Tracing output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingFormat {
    /// Human-readable format (default)
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for log aggregation
    Json,
}

impl FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(TracingFormat::Pretty),
            "compact" => Ok(TracingFormat::Compact),
            "json" => Ok(TracingFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Configuration for tracing
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Log level filter (e.g., "info", "domainkey_trust=debug")
    pub filter: String,

    /// Output format
    pub format: TracingFormat,

    /// Include span events (new, close)
    pub with_span_events: bool,

    /// Include file and line numbers
    pub with_file: bool,

    /// Include target (module path)
    pub with_target: bool,

    /// ANSI colors (for terminal output)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "warn,domainkey_trust=info".into(),
            format: TracingFormat::Pretty,
            with_span_events: false,
            with_file: false,
            with_target: true,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// JSON lines, no colors
    pub fn production() -> Self {
        Self {
            filter: "info,domainkey_trust=info".into(),
            format: TracingFormat::Json,
            with_ansi: false,
            ..Self::default()
        }
    }

    /// Verbose, with span timings and source locations
    pub fn development() -> Self {
        Self {
            filter: "debug,domainkey_trust=trace".into(),
            format: TracingFormat::Pretty,
            with_span_events: true,
            with_file: true,
            ..Self::default()
        }
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` overrides the configured filter. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_target(config.with_target);

    match config.format {
        TracingFormat::Pretty => registry.with(layer.with_ansi(config.with_ansi)).try_init()?,
        TracingFormat::Compact => registry
            .with(layer.compact().with_ansi(config.with_ansi))
            .try_init()?,
        TracingFormat::Json => registry.with(layer.json().with_ansi(false)).try_init()?,
    }

    tracing::debug!(
        filter = %config.filter,
        format = ?config.format,
        "Tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_presets() {
        assert!(TracingConfig::default().filter.contains("domainkey_trust"));
        let production = TracingConfig::production();
        assert_eq!(production.format, TracingFormat::Json);
        assert!(!production.with_ansi);
        assert!(TracingConfig::development().with_span_events);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<TracingFormat>(), Ok(TracingFormat::Json));
        assert_eq!("compact".parse::<TracingFormat>(), Ok(TracingFormat::Compact));
        assert!("xml".parse::<TracingFormat>().is_err());
    }
}
