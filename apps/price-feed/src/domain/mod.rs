//! Domain Layer - Core price feed types and business logic.
//!
//! This layer contains the price records, subscription set and snapshot
//! ordering rules. Nothing here performs I/O.

/// Price records, change direction and connection state.
pub mod price;

/// Subscription set tracking and symbol normalization.
pub mod subscription;

/// Latest-price book and ordered feed snapshots.
pub mod feed;
