//! Prometheus Metrics Module
//!
//! Application metrics recorded through the `metrics` facade.
//!
//! # Metrics Categories
//!
//! - **Frames**: Counts of frames sent to and received from the echo endpoint
//! - **Errors**: Decode and send failures
//! - **Connection**: Whether the echo connection is open
//! - **Generator**: Synthetic prices produced by the loopback generator
//!
//! Without an installed recorder every call is a no-op, so library users
//! and tests pay nothing. The binary installs the Prometheus recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use super::echo::messages::MessageKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed, e.g. because
/// another global recorder is already set.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_feed_frames_sent_total",
        "Total frames written to the echo endpoint"
    );
    describe_counter!(
        "price_feed_frames_received_total",
        "Total frames decoded from the echo endpoint"
    );
    describe_counter!(
        "price_feed_decode_errors_total",
        "Total inbound frames dropped because they could not be decoded"
    );
    describe_counter!(
        "price_feed_send_errors_total",
        "Total outbound frames that failed to encode or write"
    );
    describe_gauge!(
        "price_feed_connected",
        "1 while the echo connection is open, 0 otherwise"
    );
    describe_counter!(
        "price_feed_prices_generated_total",
        "Total synthetic prices produced by the loopback generator"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame written to the echo endpoint.
pub fn record_frame_sent(kind: MessageKind) {
    counter!("price_feed_frames_sent_total", "message_type" => kind.as_str()).increment(1);
}

/// Record a frame decoded from the echo endpoint.
pub fn record_frame_received(kind: MessageKind) {
    counter!("price_feed_frames_received_total", "message_type" => kind.as_str()).increment(1);
}

/// Record an inbound frame dropped by the codec.
pub fn record_decode_error() {
    counter!("price_feed_decode_errors_total").increment(1);
}

/// Record an outbound frame that failed to encode or write.
pub fn record_send_error(stage: &'static str) {
    counter!("price_feed_send_errors_total", "stage" => stage).increment(1);
}

/// Update the connection gauge.
pub fn set_connected(connected: bool) {
    gauge!("price_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record synthetic prices produced in one generator tick.
pub fn record_prices_generated(count: usize) {
    counter!("price_feed_prices_generated_total").increment(count as u64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_sent(MessageKind::Subscribe);
        record_frame_received(MessageKind::Prices);
        record_decode_error();
        record_send_error("write");
        set_connected(true);
        record_prices_generated(3);
    }
}
