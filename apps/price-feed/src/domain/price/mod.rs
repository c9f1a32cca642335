//! Price Records
//!
//! The canonical price record exchanged between the loopback generator,
//! the wire codec and the feed aggregator, plus the connection state
//! reported by the price feed service.
//!
//! # Unknown Prices
//!
//! Placeholder rows are created before any data has arrived for a symbol.
//! Their `price` and `previous_price` are NaN. On the wire NaN travels as
//! JSON `null`, since JSON has no representation for it.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Change Direction
// =============================================================================

/// Direction of the last price move for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeDirection {
    /// Price rose since the previous record.
    Up,
    /// Price fell since the previous record.
    Down,
    /// Price did not move, or either side is unknown.
    Unchanged,
}

// =============================================================================
// Price Record
// =============================================================================

/// Latest known price for one symbol.
///
/// Records are immutable: a newer record replaces an older one for the
/// same symbol, it never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    symbol: String,
    #[serde(with = "nan_as_null")]
    price: f64,
    #[serde(with = "nan_as_null")]
    previous_price: f64,
}

impl PriceRecord {
    /// Create a record with a known price and previous price.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: f64, previous_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            previous_price,
        }
    }

    /// Create a placeholder row whose prices are still unknown.
    #[must_use]
    pub fn placeholder(symbol: impl Into<String>) -> Self {
        Self::new(symbol, f64::NAN, f64::NAN)
    }

    /// Symbol this record belongs to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Latest price (NaN when unknown).
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Price before the latest move (NaN when unknown).
    #[must_use]
    pub const fn previous_price(&self) -> f64 {
        self.previous_price
    }

    /// Whether the record carries a defined price.
    #[must_use]
    pub const fn has_price(&self) -> bool {
        !self.price.is_nan()
    }

    /// Sign of `price - previous_price`.
    #[must_use]
    pub fn change_direction(&self) -> ChangeDirection {
        if self.price > self.previous_price {
            ChangeDirection::Up
        } else if self.price < self.previous_price {
            ChangeDirection::Down
        } else {
            ChangeDirection::Unchanged
        }
    }
}

/// Two unknown prices compare equal so that placeholder rows and decoded
/// `null` prices behave as values.
impl PartialEq for PriceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && same_price(self.price, other.price)
            && same_price(self.previous_price, other.previous_price)
    }
}

fn same_price(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

impl fmt::Display for PriceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_price() {
            write!(f, "{} {:.2}", self.symbol, self.price)
        } else {
            write!(f, "{} --", self.symbol)
        }
    }
}

/// Batch of price records delivered together.
pub type PriceBatch = Vec<PriceRecord>;

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state reported by the price feed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Echo endpoint connection is open.
    Connected,
    /// No open connection.
    #[default]
    Disconnected,
}

impl ConnectionState {
    /// Whether the state is `Connected`.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// State name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(50.0, 40.0, ChangeDirection::Up ; "price rose")]
    #[test_case(45.0, 50.0, ChangeDirection::Down ; "price fell")]
    #[test_case(10.0, 10.0, ChangeDirection::Unchanged ; "flat")]
    #[test_case(f64::NAN, f64::NAN, ChangeDirection::Unchanged ; "unknown")]
    #[test_case(10.0, f64::NAN, ChangeDirection::Unchanged ; "unknown previous")]
    fn change_direction(price: f64, previous: f64, expected: ChangeDirection) {
        let record = PriceRecord::new("AAA", price, previous);
        assert_eq!(record.change_direction(), expected);
    }

    #[test]
    fn placeholder_has_no_price() {
        let record = PriceRecord::placeholder("AAPL");
        assert!(!record.has_price());
        assert!(record.previous_price().is_nan());
        assert_eq!(record, PriceRecord::placeholder("AAPL"));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let record = PriceRecord::new("AAPL", 123.5, 120.0);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"symbol":"AAPL","price":123.5,"previousPrice":120.0}"#
        );
    }

    #[test]
    fn unknown_price_travels_as_null() {
        let json = serde_json::to_string(&PriceRecord::placeholder("MSFT")).unwrap();
        assert_eq!(json, r#"{"symbol":"MSFT","price":null,"previousPrice":null}"#);

        let decoded: PriceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, PriceRecord::placeholder("MSFT"));
    }

    #[test]
    fn missing_previous_price_is_rejected() {
        let result = serde_json::from_str::<PriceRecord>(r#"{"symbol":"X","price":1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(PriceRecord::new("KO", 61.237, 60.0).to_string(), "KO 61.24");
        assert_eq!(PriceRecord::placeholder("KO").to_string(), "KO --");
    }

    #[test]
    fn connection_state_defaults_to_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(ConnectionState::Connected.is_connected());
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
    }
}
