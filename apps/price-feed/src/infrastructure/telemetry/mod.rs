//! Tracing Subscriber Setup
//!
//! Installs a `tracing` subscriber with an environment filter and a
//! formatted stderr layer.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives. When set and valid, they replace the
//!   defaults (`price_feed=info`, with the WebSocket crates at `warn`)
//! - `PRICE_FEED_LOG_ANSI`: Set to "false" to disable colored output (default: true)
//!
//! # Usage
//!
//! ```ignore
//! use price_feed::infrastructure::telemetry;
//!
//! telemetry::init()?;
//! tracing::info!("Price feed starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Default log level for this crate.
const DEFAULT_DIRECTIVE: &str = "price_feed=info";

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Directive used when `RUST_LOG` is unset or invalid.
    pub default_directive: String,
    /// Whether to emit ANSI colors.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let ansi = std::env::var("PRICE_FEED_LOG_ANSI")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            ansi,
            ..Self::default()
        }
    }
}

/// Initialize tracing with configuration from the environment.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init() -> Result<(), TryInitError> {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize tracing with custom configuration.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_with_config(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(config, rust_log.as_deref());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(config.ansi);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}

/// Filter from `RUST_LOG` when it parses, from the defaults otherwise.
#[allow(clippy::expect_used)]
fn build_filter(config: &TelemetryConfig, rust_log: Option<&str>) -> EnvFilter {
    if let Some(filter) = rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
    {
        return filter;
    }

    let default_directive: Directive = config
        .default_directive
        .parse()
        .unwrap_or_else(|_| {
            DEFAULT_DIRECTIVE
                .parse()
                .expect("static directive 'price_feed=info' is valid")
        });

    EnvFilter::default()
        .add_directive(default_directive)
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        )
        .add_directive(
            "tokio_tungstenite=warn"
                .parse()
                .expect("static directive 'tokio_tungstenite=warn' is valid"),
        )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert!(config.ansi);
        assert_eq!(config.default_directive, DEFAULT_DIRECTIVE);
    }

    #[test]
    fn rust_log_replaces_default_directive() {
        let filter =
            build_filter(&TelemetryConfig::default(), Some("price_feed=debug")).to_string();
        assert!(filter.contains("price_feed=debug"));
        assert!(!filter.contains("price_feed=info"));
    }

    #[test]
    fn defaults_apply_without_rust_log() {
        for rust_log in [None, Some("  ")] {
            let filter = build_filter(&TelemetryConfig::default(), rust_log).to_string();
            assert!(filter.contains("price_feed=info"));
            assert!(filter.contains("tungstenite=warn"));
        }
    }

    #[test]
    fn invalid_default_directive_falls_back() {
        let config = TelemetryConfig {
            default_directive: "not a directive ===".to_string(),
            ansi: false,
        };
        assert!(
            build_filter(&config, None)
                .to_string()
                .contains("price_feed=info")
        );
    }

    #[test]
    fn second_init_fails() {
        let config = TelemetryConfig {
            default_directive: "not a directive ===".to_string(),
            ansi: false,
        };

        // The first call may fail if another test already installed a subscriber.
        let _ = init_with_config(&config);
        assert!(init_with_config(&config).is_err());
    }
}
