//! Echo Loopback Integration Tests
//!
//! Drives the price service against a local echo server: connection
//! lifecycle, generated prices, raw sends and transport failures.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

use price_feed::{
    ConnectionError, ConnectionState, EchoPriceService, EchoServer, EchoServiceConfig, PriceBatch,
    PriceRecord, RunningEchoServer, WireMessage,
};

const TICK: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(5);

async fn start_echo_server() -> RunningEchoServer {
    EchoServer::bind("127.0.0.1:0").await.unwrap().spawn()
}

fn service_for(server: &RunningEchoServer) -> EchoPriceService {
    EchoPriceService::spawn(
        EchoServiceConfig::new(server.url())
            .with_tick_interval(TICK)
            .with_seed(11),
    )
    .unwrap()
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    timeout(WAIT, rx.wait_for(|current| *current == state))
        .await
        .expect("timed out waiting for connection state")
        .unwrap();
}

async fn next_batch(rx: &mut broadcast::Receiver<PriceBatch>) -> PriceBatch {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for price batch")
        .unwrap()
}

#[tokio::test]
async fn start_and_stop_drive_connection_state() {
    let server = start_echo_server().await;
    let service = service_for(&server);
    let mut states = service.connection_states();

    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);

    service.start().await.unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Connected);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

    service.stop().await.unwrap();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);

    service.stop().await.unwrap();
    assert!(!states.has_changed().unwrap());

    server.shutdown().await;
}

#[tokio::test]
async fn subscribed_symbols_receive_echoed_prices() {
    let server = start_echo_server().await;
    let service = service_for(&server);
    let mut prices = service.price_updates();

    service
        .subscribe(vec!["aapl".to_string(), "MSFT".to_string()])
        .await
        .unwrap();
    service.start().await.unwrap();

    let batch = next_batch(&mut prices).await;
    let mut symbols: Vec<&str> = batch.iter().map(PriceRecord::symbol).collect();
    symbols.sort_unstable();
    assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    assert!(batch.iter().all(PriceRecord::has_price));

    service.stop().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn walk_continues_between_batches() {
    let server = start_echo_server().await;
    let service = service_for(&server);
    let mut prices = service.price_updates();

    service.subscribe(vec!["NVDA".to_string()]).await.unwrap();
    service.start().await.unwrap();

    let first = next_batch(&mut prices).await;
    let second = next_batch(&mut prices).await;
    assert_eq!(second[0].previous_price(), first[0].price());
    assert!((second[0].price() - second[0].previous_price()).abs() <= 3.0);

    service.stop().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn no_prices_after_stop() {
    let server = start_echo_server().await;
    let service = service_for(&server);

    service.subscribe(vec!["AAPL".to_string()]).await.unwrap();
    service.start().await.unwrap();
    service.stop().await.unwrap();

    let mut prices = service.price_updates();
    assert!(timeout(TICK * 4, prices.recv()).await.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn raw_price_batch_is_echoed() {
    let server = start_echo_server().await;
    let service = service_for(&server);
    let mut prices = service.price_updates();

    // No subscriptions, so the generator stays quiet
    service.start().await.unwrap();
    service
        .send(WireMessage::prices(vec![PriceRecord::new("RAW", 12.5, 12.0)]))
        .await
        .unwrap();

    let batch = next_batch(&mut prices).await;
    assert_eq!(batch, vec![PriceRecord::new("RAW", 12.5, 12.0)]);

    service.stop().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn server_shutdown_reports_disconnect() {
    let server = start_echo_server().await;
    let service = service_for(&server);
    let mut states = service.connection_states();

    service.start().await.unwrap();
    wait_for_state(&mut states, ConnectionState::Connected).await;

    server.shutdown().await;
    wait_for_state(&mut states, ConnectionState::Disconnected).await;

    // Sending after the transport failed is a silent no-op
    service
        .send(WireMessage::subscribe(vec!["AAPL".to_string()]))
        .await
        .unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn restart_after_stop_reconnects() {
    let server = start_echo_server().await;
    let service = service_for(&server);
    let mut prices = service.price_updates();

    service.subscribe(vec!["AAPL".to_string()]).await.unwrap();
    service.start().await.unwrap();
    service.stop().await.unwrap();
    service.start().await.unwrap();

    assert_eq!(service.connection_state(), ConnectionState::Connected);
    let batch = next_batch(&mut prices).await;
    assert_eq!(batch[0].symbol(), "AAPL");

    service.stop().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn connect_failure_reaches_error_callback() {
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);

    let service = EchoPriceService::spawn_with_error_callback(
        EchoServiceConfig::new("ws://127.0.0.1:1").with_tick_interval(TICK),
        Arc::new(move |error: &ConnectionError| {
            sink.lock().unwrap().push(error.to_string());
        }),
    )
    .unwrap();

    service.start().await.unwrap();

    assert_eq!(service.connection_state(), ConnectionState::Disconnected);
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unsubscribe_of_unknown_symbol_is_noop() {
    let server = start_echo_server().await;
    let service = service_for(&server);

    service.subscribe(vec!["AAPL".to_string()]).await.unwrap();
    service.start().await.unwrap();
    service.unsubscribe(vec!["ZZZZ".to_string()]).await.unwrap();

    assert_eq!(service.subscriptions().await.unwrap(), vec!["AAPL"]);
    assert_eq!(service.connection_state(), ConnectionState::Connected);

    service.stop().await.unwrap();
    server.shutdown().await;
}
