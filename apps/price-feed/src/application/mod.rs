//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and the port interface
//! they consume from the infrastructure layer.

/// Port interfaces for price sources.
pub mod ports;

/// Aggregation services over a price feed.
pub mod services;
