//! Echo Endpoint Adapters
//!
//! Implements the price feed on top of a WebSocket echo endpoint:
//!
//! - **Messages / Codec**: JSON wire format for subscribe, unsubscribe and
//!   price batch frames
//! - **Connection**: WebSocket client lifecycle and receive loop
//! - **Generator**: Random-walk prices written to the endpoint
//! - **Service**: Background task tying the three together
//! - **Server**: Local echo server for offline runs and tests

pub mod codec;
pub mod connection;
pub mod generator;
pub mod messages;
pub mod server;
pub mod service;

pub use codec::{CodecError, JsonCodec};
pub use connection::{
    ConnectionError, ConnectionEvent, ConnectionManager, ConnectionPhase, ErrorCallback,
};
pub use generator::{GeneratorConfig, LoopbackGenerator};
pub use messages::{MessageKind, WireMessage};
pub use server::{EchoServer, EchoServerError, RunningEchoServer};
pub use service::{EchoPriceService, EchoServiceConfig};
