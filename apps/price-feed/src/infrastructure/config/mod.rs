//! Configuration Module
//!
//! Configuration loading for the price feed.

mod settings;

pub use settings::{
    ChannelSettings, ConfigError, DEFAULT_ECHO_URL, DEFAULT_SYMBOLS, EndpointSettings,
    FeedConfig, GeneratorSettings,
};
