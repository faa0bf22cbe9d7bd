//! Logging setup for the host binary.
//!
//! Filtering follows `RUST_LOG` and defaults to `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Multi-line, colored
    Pretty,

    /// One line per event
    #[default]
    Compact,

    /// Newline-delimited JSON
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(TracingFormat::Pretty),
            "compact" => Ok(TracingFormat::Compact),
            "json" => Ok(TracingFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG or defaults to "info".
    pub level: Option<tracing::Level>,

    pub format: TracingFormat,

    /// Include target module names in output
    pub target: bool,

    pub thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Compact,
            target: true,
            thread_ids: false,
        }
    }
}

fn filter(level: Option<tracing::Level>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Initialize the global subscriber with default settings
pub fn init_subscriber() {
    init_subscriber_with_config(TracingConfig::default());
}

/// Initialize the global subscriber.
///
/// Logs go to stderr so they never mix with console replies on stdout.
pub fn init_subscriber_with_config(config: TracingConfig) {
    let registry = tracing_subscriber::registry().with(filter(config.level));
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.target)
        .with_thread_ids(config.thread_ids);

    match config.format {
        TracingFormat::Pretty => registry.with(layer.pretty()).init(),
        TracingFormat::Compact => registry.with(layer.compact()).init(),
        TracingFormat::Json => registry.with(layer.json()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingFormat::Compact);
        assert!(config.level.is_none());
        assert!(config.target);
        assert!(!config.thread_ids);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<TracingFormat>(), Ok(TracingFormat::Json));
        assert_eq!("pretty".parse::<TracingFormat>(), Ok(TracingFormat::Pretty));
        assert!("xml".parse::<TracingFormat>().is_err());
    }
}
