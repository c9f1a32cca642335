//! Feed Book and Snapshots
//!
//! Keeps the latest record per symbol and produces the ordered snapshot
//! shown to the presentation layer.
//!
//! # Ordering
//!
//! Snapshots are sorted by descending price. Records with an unknown
//! (NaN) price sort after every defined price. Equal prices, and unknown
//! prices among themselves, break ties alphabetically by symbol, so the
//! order is total and deterministic.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::price::PriceRecord;
use super::subscription::{Symbol, normalize_symbol};

/// Snapshot ordering: descending price, unknown last, then symbol.
#[must_use]
pub fn compare_records(a: &PriceRecord, b: &PriceRecord) -> Ordering {
    let by_price = match (a.has_price(), b.has_price()) {
        (true, true) => b.price().total_cmp(&a.price()),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    };

    by_price.then_with(|| a.symbol().cmp(b.symbol()))
}

// =============================================================================
// Feed Snapshot
// =============================================================================

/// Ordered, de-duplicated view of the latest record per symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    records: Vec<PriceRecord>,
}

impl FeedSnapshot {
    /// Records in display order.
    #[must_use]
    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    /// Iterate over records in display order.
    pub fn iter(&self) -> std::slice::Iter<'_, PriceRecord> {
        self.records.iter()
    }

    /// Symbols in display order.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        self.records.iter().map(PriceRecord::symbol).collect()
    }

    /// Locate the record for a symbol (any case).
    #[must_use]
    pub fn find(&self, symbol: &str) -> Option<&PriceRecord> {
        let symbol = normalize_symbol(symbol)?;
        self.records.iter().find(|r| r.symbol() == symbol)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a FeedSnapshot {
    type Item = &'a PriceRecord;
    type IntoIter = std::slice::Iter<'a, PriceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// =============================================================================
// Feed Book
// =============================================================================

/// Latest known record per symbol.
///
/// Rows are never removed: unsubscribing stops updates for a symbol but
/// its last record stays visible.
#[derive(Debug, Clone, Default)]
pub struct FeedBook {
    latest_by_symbol: HashMap<Symbol, PriceRecord>,
}

impl FeedBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a book seeded with a placeholder row per symbol.
    #[must_use]
    pub fn with_placeholders<S: AsRef<str>>(symbols: &[S]) -> Self {
        let mut book = Self::new();
        for symbol in symbols {
            book.insert_placeholder(symbol.as_ref());
        }
        book
    }

    /// Add a placeholder row unless the symbol already has one.
    ///
    /// Returns `true` if a row was added.
    pub fn insert_placeholder(&mut self, symbol: &str) -> bool {
        let Some(symbol) = normalize_symbol(symbol) else {
            return false;
        };

        if self.latest_by_symbol.contains_key(&symbol) {
            return false;
        }

        self.latest_by_symbol
            .insert(symbol.clone(), PriceRecord::placeholder(symbol));
        true
    }

    /// Apply a batch of records, overwriting per symbol.
    ///
    /// Within a batch the last record for a symbol wins. Records with an
    /// empty symbol are skipped. Returns the number of records applied.
    pub fn apply(&mut self, batch: &[PriceRecord]) -> usize {
        let mut applied = 0;
        for record in batch {
            let Some(symbol) = normalize_symbol(record.symbol()) else {
                tracing::debug!("Skipping price record without symbol");
                continue;
            };

            let record = if symbol == record.symbol() {
                record.clone()
            } else {
                PriceRecord::new(symbol.clone(), record.price(), record.previous_price())
            };

            self.latest_by_symbol.insert(symbol, record);
            applied += 1;
        }
        applied
    }

    /// Latest record for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&PriceRecord> {
        let symbol = normalize_symbol(symbol)?;
        self.latest_by_symbol.get(&symbol)
    }

    /// Number of symbols in the book.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest_by_symbol.len()
    }

    /// Whether the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest_by_symbol.is_empty()
    }

    /// Build the ordered snapshot of all rows.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        let mut records: Vec<PriceRecord> = self.latest_by_symbol.values().cloned().collect();
        records.sort_by(compare_records);
        FeedSnapshot { records }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::ChangeDirection;

    #[test]
    fn later_update_wins() {
        let mut book = FeedBook::new();

        book.apply(&[PriceRecord::new("AAA", 50.0, 40.0)]);
        book.apply(&[PriceRecord::new("AAA", 45.0, 50.0)]);

        let snapshot = book.snapshot();
        assert_eq!(snapshot.len(), 1);

        let record = snapshot.find("AAA").unwrap();
        assert!((record.price() - 45.0).abs() < f64::EPSILON);
        assert_eq!(record.change_direction(), ChangeDirection::Down);
    }

    #[test]
    fn sorted_by_descending_price() {
        let mut book = FeedBook::new();

        book.apply(&[
            PriceRecord::new("X", 100.0, 90.0),
            PriceRecord::new("Y", 200.0, 190.0),
        ]);

        assert_eq!(book.snapshot().symbols(), vec!["Y", "X"]);
    }

    #[test]
    fn last_duplicate_in_batch_wins() {
        let mut book = FeedBook::new();

        let applied = book.apply(&[
            PriceRecord::new("DUP", 10.0, 9.0),
            PriceRecord::new("DUP", 8.0, 10.0),
        ]);

        assert_eq!(applied, 2);
        assert_eq!(book.len(), 1);
        assert!((book.get("dup").unwrap().price() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn placeholders_sort_last_alphabetically() {
        let mut book = FeedBook::with_placeholders(&["ZETA", "ALFA", "MIKE"]);
        book.apply(&[
            PriceRecord::new("LOW", 1.0, 1.0),
            PriceRecord::new("HIGH", 500.0, 400.0),
        ]);

        assert_eq!(
            book.snapshot().symbols(),
            vec!["HIGH", "LOW", "ALFA", "MIKE", "ZETA"]
        );
    }

    #[test]
    fn equal_prices_break_ties_by_symbol() {
        let mut book = FeedBook::new();
        book.apply(&[
            PriceRecord::new("BBB", 10.0, 10.0),
            PriceRecord::new("AAA", 10.0, 10.0),
        ]);

        assert_eq!(book.snapshot().symbols(), vec!["AAA", "BBB"]);
    }

    #[test]
    fn update_replaces_placeholder() {
        let mut book = FeedBook::with_placeholders(&["AAPL"]);
        assert!(!book.get("AAPL").unwrap().has_price());

        book.apply(&[PriceRecord::new("aapl", 190.0, 189.0)]);

        assert_eq!(book.len(), 1);
        let record = book.get("AAPL").unwrap();
        assert_eq!(record.symbol(), "AAPL");
        assert!(record.has_price());
    }

    #[test]
    fn insert_placeholder_keeps_existing_row() {
        let mut book = FeedBook::new();
        book.apply(&[PriceRecord::new("KO", 60.0, 59.0)]);

        assert!(!book.insert_placeholder("ko"));
        assert!(book.get("KO").unwrap().has_price());
        assert!(!book.insert_placeholder(" "));
    }

    #[test]
    fn records_without_symbol_are_skipped() {
        let mut book = FeedBook::new();
        let applied = book.apply(&[PriceRecord::new("", 1.0, 1.0)]);

        assert_eq!(applied, 0);
        assert!(book.is_empty());
    }

    #[test]
    fn compare_records_orders_unknown_after_known() {
        let known = PriceRecord::new("B", 0.5, 0.5);
        let unknown = PriceRecord::placeholder("A");

        assert_eq!(compare_records(&known, &unknown), Ordering::Less);
        assert_eq!(compare_records(&unknown, &known), Ordering::Greater);
    }

    #[test]
    fn snapshot_find_is_case_insensitive() {
        let book = FeedBook::with_placeholders(&["NFLX"]);
        let snapshot = book.snapshot();

        assert!(snapshot.find("nflx").is_some());
        assert!(snapshot.find("META").is_none());
        assert_eq!(snapshot.iter().count(), 1);
        assert_eq!((&snapshot).into_iter().count(), 1);
    }
}
