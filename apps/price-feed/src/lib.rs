#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Feed - Loopback Market Data Core
//!
//! Keeps a set of subscribed symbols, streams synthetic prices for them
//! through a WebSocket echo endpoint and aggregates the echoed prices into
//! an ordered snapshot.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types and rules, no I/O
//!   - `price`: Price records, change direction, connection state
//!   - `subscription`: Symbol normalization and the subscription set
//!   - `feed`: Latest-price book and snapshot ordering
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The `PriceFeed` interface
//!   - `services`: Feed aggregator and symbol tracker
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `echo`: Wire codec, connection manager, generator, service task, local echo server
//!   - `broadcast`: Price batch and connection state channels
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────┐  prices frame   ┌───────────────┐
//! Generator tick ───►│ Service Task │────────────────►│ Echo Endpoint │
//!                    │              │◄────────────────│               │
//!                    └──────┬───────┘  echoed frame   └───────────────┘
//!                           │ PriceBatch
//!                           ▼
//!                    ┌──────────────┐      ┌────────────────┐
//!                    │   PriceHub   │─────►│ FeedAggregator │──► FeedSnapshot
//!                    └──────────────┘      └────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core price feed types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::feed::{FeedBook, FeedSnapshot};
pub use domain::price::{ChangeDirection, ConnectionState, PriceBatch, PriceRecord};
pub use domain::subscription::{SubscriptionChanges, SubscriptionSet, Symbol};

// Application
pub use application::ports::{FeedError, PriceFeed};
pub use application::services::{FeedAggregator, SymbolTracker};

// Echo adapters
pub use infrastructure::echo::{
    ConnectionError, EchoPriceService, EchoServer, EchoServiceConfig, JsonCodec, RunningEchoServer,
    WireMessage,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};
