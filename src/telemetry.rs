//! Logging initialization
//!
//! `RUST_LOG` takes precedence; otherwise `info`, or `debug` for this crate
//! when verbose output is requested. JSON output is opt-in for CI log
//! collectors.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Logging options
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingConfig {
    /// Verbose diagnostics
    pub debug: bool,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Default filter directives for a verbosity level
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        "debug,kube=info,tower=warn,hyper=warn"
    } else {
        "info,kube=warn,tower=warn,hyper=warn"
    }
}

/// Install the global tracing subscriber
pub fn init_logging(config: LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.debug)));

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_crate_verbosity_but_keeps_http_stack_quiet() {
        assert!(default_directives(true).starts_with("debug"));
        assert!(default_directives(true).contains("hyper=warn"));
        assert!(default_directives(false).starts_with("info"));
    }

    #[test]
    fn directives_parse_as_env_filters() {
        for debug in [true, false] {
            assert!(EnvFilter::try_new(default_directives(debug)).is_ok());
        }
    }
}
