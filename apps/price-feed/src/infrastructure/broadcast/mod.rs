//! Broadcast Channel Adapters
//!
//! Distributes price batches and connection state to observers.
//!
//! # Architecture
//!
//! The `PriceHub` holds two channels:
//! - Price batches on a tokio `broadcast` channel. Each observer receives
//!   every batch published after it registered.
//! - Connection state on a tokio `watch` channel. New observers see the
//!   current value immediately, then every later transition.
//!
//! Connection state is only published when it actually changes, so
//! observers never see the same state twice in a row.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::domain::price::{ConnectionState, PriceBatch};

/// Configuration for the hub's channels.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity of the price batch channel.
    pub price_updates_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            price_updates_capacity: 1_024,
        }
    }
}

/// Central hub for price batches and connection state.
///
/// # Example
///
/// ```rust
/// use price_feed::infrastructure::broadcast::{BroadcastConfig, PriceHub};
/// use price_feed::ConnectionState;
///
/// let hub = PriceHub::new(BroadcastConfig::default());
///
/// let states = hub.connection_states_rx();
/// assert_eq!(*states.borrow(), ConnectionState::Disconnected);
///
/// assert!(hub.set_connection_state(ConnectionState::Connected));
/// assert!(!hub.set_connection_state(ConnectionState::Connected));
/// ```
#[derive(Debug)]
pub struct PriceHub {
    price_updates_tx: broadcast::Sender<PriceBatch>,
    connection_state_tx: watch::Sender<ConnectionState>,
}

impl PriceHub {
    /// Create a new hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            price_updates_tx: broadcast::channel(config.price_updates_capacity.max(1)).0,
            connection_state_tx: watch::Sender::new(ConnectionState::Disconnected),
        }
    }

    /// Create a new hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    // =========================================================================
    // Price Updates
    // =========================================================================

    /// Send a price batch to all observers.
    ///
    /// Returns the number of receivers that got the batch, or `None` if
    /// there are no active receivers.
    #[must_use]
    pub fn send_price_batch(&self, batch: PriceBatch) -> Option<usize> {
        self.price_updates_tx.send(batch).ok()
    }

    /// Get a new receiver for price batches.
    #[must_use]
    pub fn price_updates_rx(&self) -> broadcast::Receiver<PriceBatch> {
        self.price_updates_tx.subscribe()
    }

    /// Get the number of active price batch receivers.
    #[must_use]
    pub fn price_updates_receiver_count(&self) -> usize {
        self.price_updates_tx.receiver_count()
    }

    // =========================================================================
    // Connection State
    // =========================================================================

    /// Publish a connection state.
    ///
    /// Returns `true` if this was a transition and observers were notified.
    pub fn set_connection_state(&self, state: ConnectionState) -> bool {
        self.connection_state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state_tx.borrow()
    }

    /// Get a new receiver for connection state.
    #[must_use]
    pub fn connection_states_rx(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state_tx.subscribe()
    }
}

/// Shared hub reference.
pub type SharedPriceHub = Arc<PriceHub>;

// =============================================================================
// Tests
// =============================================================================
