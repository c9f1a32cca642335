//! Echo Price Service
//!
//! Drives the loopback price stream: a single background task owns the
//! subscription set, the connection and the generator, and processes
//! commands, connection events and generator ticks one at a time.
//!
//! # Architecture
//!
//! ```text
//! EchoPriceService (handle) ──commands──► ServiceTask ──frames──► echo endpoint
//!                                            ▲   │                    │
//!                       connection events ───┘   └──► PriceHub ◄──────┘ (echoed prices)
//! ```
//!
//! Every command is acknowledged once the task has applied it, so callers
//! observe commands taking effect in the order they were issued. When the
//! last handle is dropped the task disconnects and exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use super::connection::{ConnectionEvent, ConnectionManager, ErrorCallback};
use super::generator::{GeneratorConfig, LoopbackGenerator};
use super::messages::WireMessage;
use crate::application::ports::{FeedError, PriceFeed};
use crate::domain::price::{ConnectionState, PriceBatch};
use crate::domain::subscription::{Symbol, SubscriptionSet};
use crate::infrastructure::broadcast::{BroadcastConfig, PriceHub, SharedPriceHub};
use crate::infrastructure::config::{ConfigError, FeedConfig};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the echo price service.
#[derive(Debug, Clone)]
pub struct EchoServiceConfig {
    /// Echo endpoint URL.
    pub url: String,
    /// Generator settings.
    pub generator: GeneratorConfig,
    /// Broadcast channel settings.
    pub broadcast: BroadcastConfig,
    /// Capacity of the connection event channel.
    pub event_capacity: usize,
    /// Capacity of the command channel.
    pub command_capacity: usize,
    /// Fixed generator seed. `None` seeds from the operating system.
    pub seed: Option<u64>,
}

impl EchoServiceConfig {
    /// Create a configuration for the given endpoint with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            generator: GeneratorConfig::default(),
            broadcast: BroadcastConfig::default(),
            event_capacity: 1_024,
            command_capacity: 64,
            seed: None,
        }
    }

    /// Set the generator tick interval.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.generator.tick_interval = interval;
        self
    }

    /// Use a fixed generator seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl From<&FeedConfig> for EchoServiceConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            url: config.endpoint.url.clone(),
            generator: GeneratorConfig::from(config.generator),
            broadcast: BroadcastConfig {
                price_updates_capacity: config.channels.price_updates_capacity,
            },
            event_capacity: config.channels.event_capacity,
            command_capacity: config.channels.command_capacity,
            seed: None,
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug)]
enum Command {
    Start {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        symbols: Vec<String>,
        reply: oneshot::Sender<()>,
    },
    Unsubscribe {
        symbols: Vec<String>,
        reply: oneshot::Sender<()>,
    },
    Send {
        message: WireMessage,
        reply: oneshot::Sender<()>,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<Symbol>>,
    },
}

// =============================================================================
// Service Handle
// =============================================================================

/// Handle to a running echo price service.
///
/// Cloning the handle is cheap; all clones control the same service.
#[derive(Clone)]
pub struct EchoPriceService {
    commands: mpsc::Sender<Command>,
    hub: SharedPriceHub,
}

impl EchoPriceService {
    /// Spawn the service task. Errors are only logged.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the generator settings are unusable.
    pub fn spawn(config: EchoServiceConfig) -> Result<Self, ConfigError> {
        Self::spawn_inner(config, None)
    }

    /// Spawn the service task with an error side channel.
    ///
    /// The callback is invoked for connection and send failures, on the
    /// service task. It must not block.
    ///
    /// # Errors
    ///
    /// Returns an error if the generator settings are unusable.
    pub fn spawn_with_error_callback(
        config: EchoServiceConfig,
        callback: ErrorCallback,
    ) -> Result<Self, ConfigError> {
        Self::spawn_inner(config, Some(callback))
    }

    fn spawn_inner(
        config: EchoServiceConfig,
        callback: Option<ErrorCallback>,
    ) -> Result<Self, ConfigError> {
        config.generator.validate()?;

        let hub = Arc::new(PriceHub::new(config.broadcast));
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let mut connection = ConnectionManager::new(config.url, Arc::clone(&hub), event_tx);
        if let Some(callback) = callback {
            connection = connection.with_error_callback(callback);
        }

        let generator = match config.seed {
            Some(seed) => LoopbackGenerator::with_seed(config.generator, seed),
            None => LoopbackGenerator::new(config.generator),
        };

        let task = ServiceTask {
            commands: command_rx,
            events: event_rx,
            connection,
            generator,
            subscriptions: SubscriptionSet::new(),
            hub: Arc::clone(&hub),
        };
        tokio::spawn(task.run());

        Ok(Self {
            commands: command_tx,
            hub,
        })
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, FeedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| FeedError::ServiceStopped)?;
        reply_rx.await.map_err(|_| FeedError::ServiceStopped)
    }

    /// Connect, send the full subscription set and start the generator.
    ///
    /// A failed connection is not an error here: the state stays
    /// `Disconnected` and the failure goes to the error callback.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ServiceStopped` if the service task has exited.
    pub async fn start(&self) -> Result<(), FeedError> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Unsubscribe everything, stop the generator and disconnect.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ServiceStopped` if the service task has exited.
    pub async fn stop(&self) -> Result<(), FeedError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Add symbols and send the resulting full set.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ServiceStopped` if the service task has exited.
    pub async fn subscribe(&self, symbols: Vec<String>) -> Result<(), FeedError> {
        self.request(|reply| Command::Subscribe { symbols, reply })
            .await
    }

    /// Remove symbols and send the ones that were actually removed.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ServiceStopped` if the service task has exited.
    pub async fn unsubscribe(&self, symbols: Vec<String>) -> Result<(), FeedError> {
        self.request(|reply| Command::Unsubscribe { symbols, reply })
            .await
    }

    /// Write a raw message to the endpoint if connected.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ServiceStopped` if the service task has exited.
    pub async fn send(&self, message: WireMessage) -> Result<(), FeedError> {
        self.request(|reply| Command::Send { message, reply })
            .await
    }

    /// Current subscription set, sorted.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ServiceStopped` if the service task has exited.
    pub async fn subscriptions(&self) -> Result<Vec<Symbol>, FeedError> {
        self.request(|reply| Command::Subscriptions { reply }).await
    }

    /// Receive every price batch published from now on.
    #[must_use]
    pub fn price_updates(&self) -> broadcast::Receiver<PriceBatch> {
        self.hub.price_updates_rx()
    }

    /// Observe the connection state.
    #[must_use]
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.hub.connection_states_rx()
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.hub.connection_state()
    }
}

impl std::fmt::Debug for EchoPriceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoPriceService")
            .field("connection_state", &self.hub.connection_state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PriceFeed for EchoPriceService {
    async fn start(&self) -> Result<(), FeedError> {
        Self::start(self).await
    }

    async fn stop(&self) -> Result<(), FeedError> {
        Self::stop(self).await
    }

    async fn subscribe(&self, symbols: Vec<String>) -> Result<(), FeedError> {
        Self::subscribe(self, symbols).await
    }

    async fn unsubscribe(&self, symbols: Vec<String>) -> Result<(), FeedError> {
        Self::unsubscribe(self, symbols).await
    }

    fn price_updates(&self) -> broadcast::Receiver<PriceBatch> {
        Self::price_updates(self)
    }

    fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        Self::connection_states(self)
    }
}

// =============================================================================
// Service Task
// =============================================================================

struct ServiceTask {
    commands: mpsc::Receiver<Command>,
    events: mpsc::Receiver<ConnectionEvent>,
    connection: ConnectionManager,
    generator: LoopbackGenerator,
    subscriptions: SubscriptionSet,
    hub: SharedPriceHub,
}

impl ServiceTask {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.generator.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                Some(event) = self.events.recv() => {
                    self.handle_event(event);
                }
                _ = ticker.tick() => {
                    self.on_tick().await;
                }
            }
        }

        self.connection.disconnect().await;
        tracing::debug!("Price feed service task exited");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                self.start().await;
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::Subscribe { symbols, reply } => {
                self.subscribe(&symbols).await;
                let _ = reply.send(());
            }
            Command::Unsubscribe { symbols, reply } => {
                self.unsubscribe(&symbols).await;
                let _ = reply.send(());
            }
            Command::Send { message, reply } => {
                self.connection.send(&message).await;
                let _ = reply.send(());
            }
            Command::Subscriptions { reply } => {
                let _ = reply.send(self.subscriptions.symbols());
            }
        }
    }

    async fn start(&mut self) {
        if let Err(e) = self.connection.connect().await {
            tracing::debug!(error = %e, "Starting without a connection");
        }

        self.generator.resume();

        let symbols = self.subscriptions.symbols();
        tracing::info!(symbols = symbols.len(), "Price feed started");
        self.connection.send(&WireMessage::subscribe(symbols)).await;
    }

    async fn stop(&mut self) {
        let symbols = self.subscriptions.symbols();
        self.connection
            .send(&WireMessage::unsubscribe(symbols))
            .await;

        self.generator.pause();
        self.connection.disconnect().await;
        tracing::info!("Price feed stopped");
    }

    async fn subscribe(&mut self, symbols: &[String]) {
        let changes = self.subscriptions.subscribe(symbols);
        if !changes.added.is_empty() {
            tracing::info!(added = ?changes.added, "Subscribed");
        }

        let full_set = self.subscriptions.symbols();
        self.connection.send(&WireMessage::subscribe(full_set)).await;
    }

    async fn unsubscribe(&mut self, symbols: &[String]) {
        let changes = self.subscriptions.unsubscribe(symbols);
        if changes.removed.is_empty() {
            tracing::debug!(?symbols, "Unsubscribe matched no symbols");
            return;
        }

        tracing::info!(removed = ?changes.removed, "Unsubscribed");
        self.connection
            .send(&WireMessage::unsubscribe(changes.removed))
            .await;
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Prices { session, payload } => {
                if !self.connection.accepts(session) {
                    tracing::trace!(session, "Dropping prices from closed connection");
                    return;
                }

                let count = payload.len();
                match self.hub.send_price_batch(payload) {
                    Some(receivers) => {
                        tracing::trace!(count, receivers, "Price batch published");
                    }
                    None => tracing::trace!(count, "Price batch had no observers"),
                }
            }
            ConnectionEvent::Closed { session, reason } => {
                self.connection.handle_closed(session, &reason);
            }
        }
    }

    async fn on_tick(&mut self) {
        let Some(batch) = self.generator.tick(self.subscriptions.iter()) else {
            return;
        };

        metrics::record_prices_generated(batch.len());
        self.connection.send(&WireMessage::prices(batch)).await;
    }
}
