//! Symbol Tracker
//!
//! Follows a single symbol on a price feed.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::application::ports::PriceFeed;
use crate::domain::price::{PriceBatch, PriceRecord};

/// Tracks the latest record for one symbol.
///
/// Starts from a given record and replaces it with every record for the
/// same symbol (case-insensitive) seen on the feed. When a batch holds
/// several records for the symbol, the last one wins rather than the
/// first, so the tracker always agrees with the aggregator's row for the
/// same batch.
pub struct SymbolTracker {
    record_rx: watch::Receiver<PriceRecord>,
    follow_task: JoinHandle<()>,
}

impl SymbolTracker {
    /// Start tracking `initial.symbol()` on `feed`.
    #[must_use]
    pub fn new<P: PriceFeed + ?Sized>(initial: PriceRecord, feed: &P) -> Self {
        let symbol = initial.symbol().to_string();
        let (record_tx, record_rx) = watch::channel(initial);
        let follow_task = tokio::spawn(follow(symbol, feed.price_updates(), record_tx));

        Self {
            record_rx,
            follow_task,
        }
    }

    /// Tracked symbol.
    #[must_use]
    pub fn symbol(&self) -> String {
        self.record_rx.borrow().symbol().to_string()
    }

    /// Latest record.
    #[must_use]
    pub fn record(&self) -> PriceRecord {
        self.record_rx.borrow().clone()
    }

    /// Observe the record as it changes.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<PriceRecord> {
        self.record_rx.clone()
    }
}

impl Drop for SymbolTracker {
    fn drop(&mut self) {
        self.follow_task.abort();
    }
}

impl std::fmt::Debug for SymbolTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTracker")
            .field("record", &*self.record_rx.borrow())
            .finish_non_exhaustive()
    }
}

async fn follow(
    symbol: String,
    mut updates: broadcast::Receiver<PriceBatch>,
    record_tx: watch::Sender<PriceRecord>,
) {
    loop {
        match updates.recv().await {
            Ok(batch) => {
                if let Some(record) = batch
                    .iter()
                    .rev()
                    .find(|r| r.symbol().eq_ignore_ascii_case(&symbol))
                {
                    record_tx.send_replace(record.clone());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(%symbol, skipped, "Symbol tracker lagged behind price updates");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
