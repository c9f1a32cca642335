//! Application Services
//!
//! Services that consume a [`PriceFeed`](crate::application::ports::PriceFeed).
//!
//! - `FeedAggregator`: Ordered snapshot of the latest price per symbol
//! - `SymbolTracker`: Latest record for a single symbol

mod aggregator;
mod symbol_tracker;

pub use aggregator::FeedAggregator;
pub use symbol_tracker::SymbolTracker;
