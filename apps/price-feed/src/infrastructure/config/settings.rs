//! Price Feed Configuration Settings
//!
//! Configuration types for the price feed, loaded from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PRICE_FEED_URL` | `wss://ws.postman-echo.com/raw` |
//! | `PRICE_FEED_LOCAL_ECHO` | `false` |
//! | `PRICE_FEED_LOCAL_ECHO_PORT` | `0` |
//! | `PRICE_FEED_SYMBOLS` | 30 large-cap tickers |
//! | `PRICE_FEED_TICK_INTERVAL_MS` | `2000` |
//! | `PRICE_FEED_INITIAL_PRICE_MIN` | `80` |
//! | `PRICE_FEED_INITIAL_PRICE_MAX` | `300` |
//! | `PRICE_FEED_MAX_STEP` | `3` |
//! | `PRICE_FEED_PRICE_CHANNEL_CAPACITY` | `1024` |
//! | `PRICE_FEED_EVENT_CHANNEL_CAPACITY` | `1024` |
//! | `PRICE_FEED_COMMAND_CHANNEL_CAPACITY` | `64` |
//!
//! Values that fail to parse fall back to the default with a warning.
//! Values that parse but make no sense are rejected by validation.

use std::time::Duration;

use crate::domain::subscription::normalize_symbol;

/// Public echo endpoint.
pub const DEFAULT_ECHO_URL: &str = "wss://ws.postman-echo.com/raw";

/// Default watch list.
pub const DEFAULT_SYMBOLS: [&str; 30] = [
    "AAPL", "MSFT", "NVDA", "TSLA", "AMZN", "GOOGL", "META", "NFLX", "AMD", "INTC", "BABA", "ORCL",
    "CRM", "ADBE", "PYPL", "JPM", "BAC", "WMT", "KO", "PFE", "NKE", "T", "VZ", "UBER", "LYFT",
    "SHOP", "SQ", "SPOT", "BP", "RIO",
];

/// Echo endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// WebSocket URL of the echo endpoint.
    pub url: String,
    /// Run a local echo server and connect to it instead of `url`.
    pub local_echo: bool,
    /// Port for the local echo server (0 = any free port).
    pub local_echo_port: u16,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_ECHO_URL.to_string(),
            local_echo: false,
            local_echo_port: 0,
        }
    }
}

/// Loopback generator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSettings {
    /// Time between generated batches.
    pub tick_interval: Duration,
    /// Lower bound of a symbol's first price.
    pub initial_price_min: f64,
    /// Upper bound of a symbol's first price.
    pub initial_price_max: f64,
    /// Largest absolute change per tick.
    pub max_step: f64,
}

impl GeneratorSettings {
    /// Check that the generator can run with these values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found, keyed by its environment
    /// variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::invalid(
                "PRICE_FEED_TICK_INTERVAL_MS",
                "must be greater than zero",
            ));
        }
        if !(self.initial_price_min.is_finite() && self.initial_price_min > 0.0) {
            return Err(ConfigError::invalid(
                "PRICE_FEED_INITIAL_PRICE_MIN",
                "must be a positive number",
            ));
        }
        if !(self.initial_price_max.is_finite()
            && self.initial_price_max > self.initial_price_min)
        {
            return Err(ConfigError::invalid(
                "PRICE_FEED_INITIAL_PRICE_MAX",
                "must be greater than PRICE_FEED_INITIAL_PRICE_MIN",
            ));
        }
        if !(self.max_step.is_finite() && self.max_step > 0.0) {
            return Err(ConfigError::invalid(
                "PRICE_FEED_MAX_STEP",
                "must be a positive number",
            ));
        }

        Ok(())
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(2_000),
            initial_price_min: 80.0,
            initial_price_max: 300.0,
            max_step: 3.0,
        }
    }
}

/// Channel capacity settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Capacity of the price batch broadcast channel.
    pub price_updates_capacity: usize,
    /// Capacity of the connection event channel.
    pub event_capacity: usize,
    /// Capacity of the service command channel.
    pub command_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            price_updates_capacity: 1_024,
            event_capacity: 1_024,
            command_capacity: 64,
        }
    }
}

/// Complete price feed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Echo endpoint settings.
    pub endpoint: EndpointSettings,
    /// Generator settings.
    pub generator: GeneratorSettings,
    /// Channel settings.
    pub channels: ChannelSettings,
    /// Watch list, normalized and de-duplicated in order.
    pub symbols: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings::default(),
            generator: GeneratorSettings::default(),
            channels: ChannelSettings::default(),
            symbols: DEFAULT_SYMBOLS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let endpoint = EndpointSettings {
            url: env
                .string("PRICE_FEED_URL")
                .unwrap_or(defaults.endpoint.url),
            local_echo: env.parse_bool("PRICE_FEED_LOCAL_ECHO", defaults.endpoint.local_echo),
            local_echo_port: env.parse(
                "PRICE_FEED_LOCAL_ECHO_PORT",
                defaults.endpoint.local_echo_port,
            ),
        };

        let generator = GeneratorSettings {
            tick_interval: env.parse_duration_millis(
                "PRICE_FEED_TICK_INTERVAL_MS",
                defaults.generator.tick_interval,
            ),
            initial_price_min: env.parse(
                "PRICE_FEED_INITIAL_PRICE_MIN",
                defaults.generator.initial_price_min,
            ),
            initial_price_max: env.parse(
                "PRICE_FEED_INITIAL_PRICE_MAX",
                defaults.generator.initial_price_max,
            ),
            max_step: env.parse("PRICE_FEED_MAX_STEP", defaults.generator.max_step),
        };

        let channels = ChannelSettings {
            price_updates_capacity: env.parse(
                "PRICE_FEED_PRICE_CHANNEL_CAPACITY",
                defaults.channels.price_updates_capacity,
            ),
            event_capacity: env.parse(
                "PRICE_FEED_EVENT_CHANNEL_CAPACITY",
                defaults.channels.event_capacity,
            ),
            command_capacity: env.parse(
                "PRICE_FEED_COMMAND_CHANNEL_CAPACITY",
                defaults.channels.command_capacity,
            ),
        };

        let symbols = env
            .string("PRICE_FEED_SYMBOLS")
            .map_or(defaults.symbols, |list| parse_symbol_list(&list));

        let config = Self {
            endpoint,
            generator,
            channels,
            symbols,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.endpoint.url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::invalid(
                "PRICE_FEED_URL",
                format!("expected a ws:// or wss:// URL, got {url:?}"),
            ));
        }

        self.generator.validate()?;

        for (key, capacity) in [
            (
                "PRICE_FEED_PRICE_CHANNEL_CAPACITY",
                self.channels.price_updates_capacity,
            ),
            (
                "PRICE_FEED_EVENT_CHANNEL_CAPACITY",
                self.channels.event_capacity,
            ),
            (
                "PRICE_FEED_COMMAND_CHANNEL_CAPACITY",
                self.channels.command_capacity,
            ),
        ] {
            if capacity == 0 {
                return Err(ConfigError::invalid(key, "must be greater than zero"));
            }
        }

        if self.symbols.is_empty() {
            return Err(ConfigError::invalid(
                "PRICE_FEED_SYMBOLS",
                "must name at least one symbol",
            ));
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Value is present but unusable.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

/// Split a comma-separated list into normalized, de-duplicated symbols.
fn parse_symbol_list(list: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in list.split(',').filter_map(normalize_symbol) {
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> T
    where
        T: std::str::FromStr,
    {
        self.parse_opt(key).unwrap_or(default)
    }

    /// Parsed value, or `None` with a warning when set but unparseable.
    fn parse_opt<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        let raw = self.string(key)?;
        raw.parse().map_or_else(
            |_| {
                tracing::warn!(key, value = %raw, "Ignoring unparseable setting, using default");
                None
            },
            Some,
        )
    }

    fn parse_bool(&self, key: &str, default: bool) -> bool {
        match self.string(key).map(|v| v.to_lowercase()).as_deref() {
            None => default,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => {
                tracing::warn!(key, value = other, "Ignoring unparseable setting, using default");
                default
            }
        }
    }

    fn parse_duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse_opt::<u64>(key)
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<FeedConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        FeedConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, FeedConfig::default());
        assert_eq!(config.endpoint.url, DEFAULT_ECHO_URL);
        assert_eq!(config.symbols.len(), 30);
        assert_eq!(config.generator.tick_interval, Duration::from_secs(2));
    }

    #[test]
    fn overrides_from_environment() {
        let config = config_from(&[
            ("PRICE_FEED_URL", "ws://127.0.0.1:9001"),
            ("PRICE_FEED_LOCAL_ECHO", "true"),
            ("PRICE_FEED_LOCAL_ECHO_PORT", "9001"),
            ("PRICE_FEED_TICK_INTERVAL_MS", "250"),
            ("PRICE_FEED_MAX_STEP", "0.5"),
            ("PRICE_FEED_COMMAND_CHANNEL_CAPACITY", "8"),
            ("PRICE_FEED_SYMBOLS", "aapl, msft,,AAPL"),
        ])
        .unwrap();

        assert_eq!(config.endpoint.url, "ws://127.0.0.1:9001");
        assert!(config.endpoint.local_echo);
        assert_eq!(config.endpoint.local_echo_port, 9001);
        assert_eq!(config.generator.tick_interval, Duration::from_millis(250));
        assert!((config.generator.max_step - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.channels.command_capacity, 8);
        assert_eq!(config.symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("PRICE_FEED_TICK_INTERVAL_MS", "soon"),
            ("PRICE_FEED_LOCAL_ECHO", "maybe"),
            ("PRICE_FEED_PRICE_CHANNEL_CAPACITY", "-1"),
        ])
        .unwrap();

        assert_eq!(config, FeedConfig::default());
    }

    #[test_case("PRICE_FEED_URL", "http://example.com" ; "non websocket url")]
    #[test_case("PRICE_FEED_TICK_INTERVAL_MS", "0" ; "zero interval")]
    #[test_case("PRICE_FEED_INITIAL_PRICE_MIN", "-5" ; "negative minimum")]
    #[test_case("PRICE_FEED_INITIAL_PRICE_MAX", "50" ; "maximum below minimum")]
    #[test_case("PRICE_FEED_MAX_STEP", "0" ; "zero step")]
    #[test_case("PRICE_FEED_EVENT_CHANNEL_CAPACITY", "0" ; "zero capacity")]
    #[test_case("PRICE_FEED_SYMBOLS", " , ," ; "empty symbol list")]
    fn rejects_invalid_value(key: &'static str, value: &str) {
        match config_from(&[(key, value)]) {
            Err(ConfigError::InvalidValue { key: reported, .. }) => assert_eq!(reported, key),
            Ok(config) => panic!("expected {key} to be rejected, got {config:?}"),
        }
    }

    #[test_case("soon" ; "word")]
    #[test_case("-250" ; "negative")]
    #[test_case("1.5" ; "fractional")]
    fn unparseable_tick_interval_is_ignored(raw: &str) {
        let env = EnvReader {
            lookup: |_: &str| Some(raw.to_string()),
        };
        assert_eq!(env.parse_opt::<u64>("PRICE_FEED_TICK_INTERVAL_MS"), None);
        assert_eq!(
            env.parse_duration_millis("PRICE_FEED_TICK_INTERVAL_MS", Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn generator_settings_reject_non_finite_step() {
        let settings = GeneratorSettings {
            max_step: f64::NAN,
            ..GeneratorSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue {
                key: "PRICE_FEED_MAX_STEP",
                ..
            })
        ));
        assert_eq!(GeneratorSettings::default().validate(), Ok(()));
    }

    #[test_case("1", true)]
    #[test_case("YES", true)]
    #[test_case("off", false)]
    #[test_case("False", false)]
    fn bool_parsing(raw: &str, expected: bool) {
        let config = config_from(&[("PRICE_FEED_LOCAL_ECHO", raw)]).unwrap();
        assert_eq!(config.endpoint.local_echo, expected);
    }

    #[test]
    fn blank_values_are_unset() {
        let config = config_from(&[("PRICE_FEED_URL", "   ")]).unwrap();
        assert_eq!(config.endpoint.url, DEFAULT_ECHO_URL);
    }
}
