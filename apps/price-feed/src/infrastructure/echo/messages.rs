//! Echo Wire Message Types
//!
//! Wire format for the frames exchanged with the echo endpoint. Every
//! frame is one JSON object discriminated by its `type` field.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"type": "subscribe", "symbols": ["AAPL", "MSFT"]}
//! {"type": "unsubscribe", "symbols": ["MSFT"]}
//! {"type": "prices", "payload": [{"symbol": "AAPL", "price": 191.2, "previousPrice": 190.4}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::price::PriceRecord;
use crate::domain::subscription::Symbol;

/// Message carried by one text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    /// Subscribe to the listed symbols.
    Subscribe {
        /// Symbols to subscribe.
        symbols: Vec<Symbol>,
    },
    /// Unsubscribe from the listed symbols.
    Unsubscribe {
        /// Symbols to unsubscribe.
        symbols: Vec<Symbol>,
    },
    /// Batch of price records.
    #[serde(rename = "prices")]
    PriceBatch {
        /// Records in the batch.
        payload: Vec<PriceRecord>,
    },
}

impl WireMessage {
    /// Subscribe message for the given symbols.
    #[must_use]
    pub const fn subscribe(symbols: Vec<Symbol>) -> Self {
        Self::Subscribe { symbols }
    }

    /// Unsubscribe message for the given symbols.
    #[must_use]
    pub const fn unsubscribe(symbols: Vec<Symbol>) -> Self {
        Self::Unsubscribe { symbols }
    }

    /// Price batch message.
    #[must_use]
    pub const fn prices(payload: Vec<PriceRecord>) -> Self {
        Self::PriceBatch { payload }
    }

    /// Wire value of the `type` discriminator.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Subscribe { .. } => MessageKind::Subscribe,
            Self::Unsubscribe { .. } => MessageKind::Unsubscribe,
            Self::PriceBatch { .. } => MessageKind::Prices,
        }
    }
}

/// Discriminator of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `"subscribe"`
    Subscribe,
    /// `"unsubscribe"`
    Unsubscribe,
    /// `"prices"`
    Prices,
}

impl MessageKind {
    /// Parse the `type` field value.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            "prices" => Some(Self::Prices),
            _ => None,
        }
    }

    /// The `type` field value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Prices => "prices",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_wire_format() {
        let msg = WireMessage::subscribe(vec!["AAPL".to_string()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","symbols":["AAPL"]}"#);
    }

    #[test]
    fn prices_wire_format() {
        let msg = WireMessage::prices(vec![PriceRecord::new("T", 17.5, 17.25)]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"prices","payload":[{"symbol":"T","price":17.5,"previousPrice":17.25}]}"#
        );
    }

    #[test]
    fn kind_matches_wire_type() {
        for kind in [
            MessageKind::Subscribe,
            MessageKind::Unsubscribe,
            MessageKind::Prices,
        ] {
            assert_eq!(MessageKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::from_wire("price"), None);
        assert_eq!(
            WireMessage::unsubscribe(vec![]).kind(),
            MessageKind::Unsubscribe
        );
    }
}
