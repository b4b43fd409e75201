//! Prometheus metrics for the dispatch client.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a fatal configuration error that should
//! crash at startup. These panics only occur during static initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter, CounterVec,
    Encoder, Gauge, GaugeVec, IntCounter, TextEncoder,
};

const HUB_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "reconnecting"];

/// Push connection state (1 = connected, 0 = not).
pub static HUB_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "rd_hub_connected",
        "Push connection state (1=connected)"
    )
    .unwrap()
});

/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static HUB_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "rd_hub_state",
        "Push connection current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static HUB_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "rd_hub_reconnect_total",
        "Total push connection reconnection attempts"
    )
    .unwrap()
});

pub static HUB_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "rd_hub_errors_total",
        "Total push connection errors reported to listeners"
    )
    .unwrap()
});

/// Labels: event (wire name)
pub static HUB_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rd_hub_events_total",
        "Total events dispatched to listeners",
        &["event"]
    )
    .unwrap()
});

/// Labels: store, kind (network/validation/not_found/backend)
pub static STORE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "rd_store_failures_total",
        "Total container actions that ended in an error",
        &["store", "kind"]
    )
    .unwrap()
});

pub static STORE_ITEMS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "rd_store_items",
        "Entries currently held by a container",
        &["store"]
    )
    .unwrap()
});

/// Backend total; differs from `rd_store_items` for paginated containers.
pub static STORE_TOTAL: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "rd_store_total",
        "Total record count reported for a container",
        &["store"]
    )
    .unwrap()
});

pub static STORE_LOADING: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "rd_store_loading",
        "Container has an action in flight (1=loading)",
        &["store"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the push connection state. Only the active state is 1.
    pub fn hub_state_set(state: &str) {
        for s in HUB_STATES {
            HUB_STATE.with_label_values(&[s]).set(0.0);
        }
        HUB_STATE.with_label_values(&[state]).set(1.0);
        HUB_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    pub fn hub_reconnect() {
        HUB_RECONNECT_TOTAL.inc();
    }

    pub fn hub_error() {
        HUB_ERRORS_TOTAL.inc();
    }

    pub fn hub_event(event: &str) {
        HUB_EVENTS_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn store_failure(store: &str, kind: &str) {
        STORE_FAILURES_TOTAL.with_label_values(&[store, kind]).inc();
    }

    /// Record a container snapshot.
    pub fn store_snapshot(store: &str, items: usize, total: u64, loading: bool) {
        STORE_ITEMS.with_label_values(&[store]).set(items as f64);
        STORE_TOTAL.with_label_values(&[store]).set(total as f64);
        STORE_LOADING
            .with_label_values(&[store])
            .set(if loading { 1.0 } else { 0.0 });
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_state_is_exclusive() {
        Metrics::hub_state_set("reconnecting");
        Metrics::hub_state_set("connected");

        assert_eq!(HUB_STATE.with_label_values(&["connected"]).get(), 1.0);
        assert_eq!(HUB_STATE.with_label_values(&["reconnecting"]).get(), 0.0);
        assert_eq!(HUB_CONNECTED.get(), 1.0);
    }

    #[test]
    fn test_store_snapshot_and_render() {
        Metrics::store_snapshot("incident", 20, 134, true);
        Metrics::store_failure("incident", "network");

        assert_eq!(STORE_TOTAL.with_label_values(&["incident"]).get(), 134.0);
        let text = Metrics::render().unwrap();
        assert!(text.contains("rd_store_items{store=\"incident\"} 20"));
        assert!(text.contains("rd_store_failures_total"));
    }
}
