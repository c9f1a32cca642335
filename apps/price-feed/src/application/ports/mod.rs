//! Port Interfaces
//!
//! Defines the interfaces (ports) between the application services and the
//! price source, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceFeed`: A controllable stream of price batches with a
//!   subscription set and an observable connection state

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::domain::price::{ConnectionState, PriceBatch};

/// Errors returned by a price feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The feed's background task is no longer running.
    #[error("price feed service has stopped")]
    ServiceStopped,
}

/// A controllable source of price batches.
///
/// Commands are applied in the order they are issued. Transport failures
/// are not reported through these results: they surface as a
/// `Disconnected` connection state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Connect, announce the subscription set and start generating prices.
    async fn start(&self) -> Result<(), FeedError>;

    /// Withdraw the subscription set, stop generating and disconnect.
    async fn stop(&self) -> Result<(), FeedError>;

    /// Add symbols to the subscription set.
    async fn subscribe(&self, symbols: Vec<String>) -> Result<(), FeedError>;

    /// Remove symbols from the subscription set.
    async fn unsubscribe(&self, symbols: Vec<String>) -> Result<(), FeedError>;

    /// Receive every price batch published from now on.
    fn price_updates(&self) -> broadcast::Receiver<PriceBatch>;

    /// Observe the connection state, starting with the current value.
    fn connection_states(&self) -> watch::Receiver<ConnectionState>;
}
