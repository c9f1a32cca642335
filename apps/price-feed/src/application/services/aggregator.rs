//! Feed Aggregator
//!
//! Keeps the latest record per symbol and publishes an ordered snapshot
//! after every applied batch.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::application::ports::{FeedError, PriceFeed};
use crate::domain::feed::{FeedBook, FeedSnapshot};
use crate::domain::price::{ConnectionState, PriceBatch, PriceRecord};
use crate::domain::subscription::{Symbol, normalize_symbols};

/// Placeholder rows queued for the apply task, acknowledged once published.
struct WatchRequest {
    symbols: Vec<Symbol>,
    reply: oneshot::Sender<()>,
}

/// Aggregates a price feed into an ordered snapshot.
///
/// On creation the watch list is seeded as placeholder rows and subscribed
/// on the feed. Symbols added later through [`FeedAggregator::subscribe`]
/// get a placeholder row right away, even while the feed is stopped.
/// A background task applies every price batch to the book
/// and publishes the new snapshot. The task is aborted when the aggregator
/// is dropped.
pub struct FeedAggregator<P: PriceFeed + 'static> {
    feed: Arc<P>,
    snapshot_rx: watch::Receiver<FeedSnapshot>,
    watch_tx: mpsc::Sender<WatchRequest>,
    running_tx: watch::Sender<bool>,
    apply_task: JoinHandle<()>,
}

impl<P: PriceFeed + 'static> FeedAggregator<P> {
    /// Create an aggregator over `feed` watching `symbols`.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed rejects the initial subscription.
    pub async fn new<S: AsRef<str> + Sync>(
        feed: Arc<P>,
        symbols: &[S],
    ) -> Result<Self, FeedError> {
        let book = FeedBook::with_placeholders(symbols);
        let (snapshot_tx, snapshot_rx) = watch::channel(book.snapshot());

        // Register before subscribing so no echoed batch is missed
        let updates = feed.price_updates();
        let (watch_tx, watch_rx) = mpsc::channel(WATCH_REQUEST_CAPACITY);
        let apply_task = tokio::spawn(apply_updates(book, updates, watch_rx, snapshot_tx));

        let aggregator = Self {
            feed,
            snapshot_rx,
            watch_tx,
            running_tx: watch::Sender::new(false),
            apply_task,
        };

        let symbols = normalize_symbols(symbols);
        if !symbols.is_empty() {
            aggregator.feed.subscribe(symbols).await?;
        }

        Ok(aggregator)
    }

    /// Add `symbols` to the watch list and subscribe them on the feed.
    ///
    /// Unknown symbols appear as placeholder rows in the snapshot before the
    /// feed is asked to subscribe them. Rows already present keep their
    /// latest record.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed service or the apply task has stopped.
    pub async fn subscribe<S: AsRef<str> + Sync>(
        &self,
        symbols: &[S],
    ) -> Result<(), FeedError> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Ok(());
        }

        let (reply, ack) = oneshot::channel();
        self.watch_tx
            .send(WatchRequest {
                symbols: symbols.clone(),
                reply,
            })
            .await
            .map_err(|_| FeedError::ServiceStopped)?;
        ack.await.map_err(|_| FeedError::ServiceStopped)?;

        self.feed.subscribe(symbols).await
    }

    /// Unsubscribe `symbols` on the feed. Their rows stay in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed service has stopped.
    pub async fn unsubscribe<S: AsRef<str> + Sync>(
        &self,
        symbols: &[S],
    ) -> Result<(), FeedError> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Ok(());
        }
        self.feed.unsubscribe(symbols).await
    }

    /// The underlying feed.
    #[must_use]
    pub const fn feed(&self) -> &Arc<P> {
        &self.feed
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Observe snapshots as they are published.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Latest record for a symbol, case-insensitive.
    #[must_use]
    pub fn find(&self, symbol: &str) -> Option<PriceRecord> {
        self.snapshot_rx.borrow().find(symbol).cloned()
    }

    /// Current connection state of the feed.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.feed.connection_states().borrow()
    }

    /// Observe the feed's connection state.
    #[must_use]
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.feed.connection_states()
    }

    /// Whether the feed was last started rather than stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }

    /// Observe the running flag.
    #[must_use]
    pub fn running_states(&self) -> watch::Receiver<bool> {
        self.running_tx.subscribe()
    }

    /// Start the feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed service has stopped.
    pub async fn start(&self) -> Result<(), FeedError> {
        self.feed.start().await?;
        self.running_tx.send_replace(true);
        Ok(())
    }

    /// Stop the feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed service has stopped.
    pub async fn stop(&self) -> Result<(), FeedError> {
        self.running_tx.send_replace(false);
        self.feed.stop().await
    }

    /// Stop if running, start otherwise. Returns the new running flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed service has stopped.
    pub async fn toggle(&self) -> Result<bool, FeedError> {
        if self.is_running() {
            self.stop().await?;
        } else {
            self.start().await?;
        }
        Ok(self.is_running())
    }
}

impl<P: PriceFeed + 'static> Drop for FeedAggregator<P> {
    fn drop(&mut self) {
        self.apply_task.abort();
    }
}

impl<P: PriceFeed + 'static> std::fmt::Debug for FeedAggregator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedAggregator")
            .field("rows", &self.snapshot_rx.borrow().len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Pending `subscribe` calls buffered ahead of the apply task.
const WATCH_REQUEST_CAPACITY: usize = 16;

async fn apply_updates(
    mut book: FeedBook,
    mut updates: broadcast::Receiver<PriceBatch>,
    mut watch_rx: mpsc::Receiver<WatchRequest>,
    snapshot_tx: watch::Sender<FeedSnapshot>,
) {
    loop {
        tokio::select! {
            Some(request) = watch_rx.recv() => {
                let mut added = 0;
                for symbol in &request.symbols {
                    if book.insert_placeholder(symbol) {
                        added += 1;
                    }
                }
                if added > 0 {
                    tracing::debug!(added, "Watching new symbols");
                    snapshot_tx.send_replace(book.snapshot());
                }
                let _ = request.reply.send(());
            }
            update = updates.recv() => match update {
                Ok(batch) => {
                    if book.apply(&batch) > 0 {
                        snapshot_tx.send_replace(book.snapshot());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Aggregator lagged behind price updates");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
