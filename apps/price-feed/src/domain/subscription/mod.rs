//! Subscription Set
//!
//! Domain type for the symbols the price feed service is subscribed to.
//!
//! # Design
//!
//! Symbols are normalized to uppercase before they enter the set. The set
//! is owned by the price feed service; the transport only ever sees the
//! symbol lists produced here. A `BTreeSet` keeps the listing order stable
//! so outbound messages are reproducible.

use std::collections::BTreeSet;

// =============================================================================
// Types
// =============================================================================

/// A normalized (trimmed, uppercase) symbol string.
pub type Symbol = String;

/// Normalize a raw symbol.
///
/// Returns `None` for symbols that are empty after trimming.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Normalize a list of raw symbols, dropping empty entries.
#[must_use]
pub fn normalize_symbols<S: AsRef<str>>(raw: &[S]) -> Vec<Symbol> {
    raw.iter()
        .filter_map(|s| normalize_symbol(s.as_ref()))
        .collect()
}

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes produced by applying a subscribe or unsubscribe to the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols newly added to the set.
    pub added: Vec<Symbol>,
    /// Symbols removed from the set.
    pub removed: Vec<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// =============================================================================
// Subscription Set
// =============================================================================

/// Set of symbols the feed is subscribed to.
///
/// # Example
///
/// ```rust
/// use price_feed::domain::subscription::SubscriptionSet;
///
/// let mut set = SubscriptionSet::new();
/// let changes = set.subscribe(&["aapl", "msft"]);
/// assert_eq!(changes.added, vec!["AAPL", "MSFT"]);
///
/// // Removing a symbol that was never subscribed changes nothing
/// let changes = set.unsubscribe(&["TSLA"]);
/// assert!(changes.is_empty());
/// assert_eq!(set.symbols(), vec!["AAPL", "MSFT"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    symbols: BTreeSet<Symbol>,
}

impl SubscriptionSet {
    /// Create an empty subscription set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Union the normalized symbols into the set.
    ///
    /// Returns the symbols that were not already present.
    pub fn subscribe<S: AsRef<str>>(&mut self, symbols: &[S]) -> SubscriptionChanges {
        let mut added = Vec::new();
        for symbol in normalize_symbols(symbols) {
            if self.symbols.insert(symbol.clone()) {
                added.push(symbol);
            }
        }

        SubscriptionChanges {
            added,
            removed: Vec::new(),
        }
    }

    /// Remove the normalized symbols from the set.
    ///
    /// Returns exactly the symbols that were present and got removed.
    pub fn unsubscribe<S: AsRef<str>>(&mut self, symbols: &[S]) -> SubscriptionChanges {
        let mut removed = Vec::new();
        for symbol in normalize_symbols(symbols) {
            if self.symbols.remove(&symbol) {
                removed.push(symbol);
            }
        }

        SubscriptionChanges {
            added: Vec::new(),
            removed,
        }
    }

    /// All subscribed symbols in ascending order.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().cloned().collect()
    }

    /// Iterate over subscribed symbols in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Check whether a symbol (any case) is subscribed.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        normalize_symbol(symbol).is_some_and(|s| self.symbols.contains(&s))
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_symbol(" aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("BrK.b"), Some("BRK.B".to_string()));
        assert_eq!(normalize_symbol("   "), None);
        assert_eq!(normalize_symbol(""), None);
    }

    #[test]
    fn subscribe_unions_symbols() {
        let mut set = SubscriptionSet::new();

        set.subscribe(&["AAPL", "MSFT"]);
        let changes = set.subscribe(&["msft", "nvda"]);

        assert_eq!(changes.added, vec!["NVDA"]);
        assert_eq!(set.symbols(), vec!["AAPL", "MSFT", "NVDA"]);
    }

    #[test]
    fn subscribe_existing_symbol_adds_nothing() {
        let mut set = SubscriptionSet::new();
        set.subscribe(&["AAPL"]);

        let changes = set.subscribe(&["aapl"]);

        assert!(changes.is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn subscribe_skips_empty_symbols() {
        let mut set = SubscriptionSet::new();
        let changes = set.subscribe(&["", "  ", "t"]);

        assert_eq!(changes.added, vec!["T"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unsubscribe_reports_exactly_removed_symbols() {
        let mut set = SubscriptionSet::new();
        set.subscribe(&["AAPL", "MSFT", "KO"]);

        let changes = set.unsubscribe(&["msft", "TSLA"]);

        assert_eq!(changes.removed, vec!["MSFT"]);
        assert!(changes.added.is_empty());
        assert_eq!(set.symbols(), vec!["AAPL", "KO"]);
    }

    #[test]
    fn unsubscribe_never_subscribed_is_noop() {
        let mut set = SubscriptionSet::new();
        set.subscribe(&["AAPL"]);

        let changes = set.unsubscribe(&["ZZZZ"]);

        assert!(changes.is_empty());
        assert_eq!(set.symbols(), vec!["AAPL"]);
    }

    #[test]
    fn contains_is_case_insensitive() {
        let mut set = SubscriptionSet::new();
        set.subscribe(&["uber"]);

        assert!(set.contains("UBER"));
        assert!(set.contains("Uber"));
        assert!(!set.contains("LYFT"));
        assert!(!set.contains(""));
    }

    #[test]
    fn empty_set() {
        let set = SubscriptionSet::new();
        assert!(set.is_empty());
        assert!(set.symbols().is_empty());
        assert_eq!(set.iter().count(), 0);
    }
}
