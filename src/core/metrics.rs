// src/core/metrics.rs

//! Defines and registers Prometheus metrics for relay monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Connection Gauges ---
    /// The number of sockets currently open.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("posture_relay_connected_clients", "Number of currently open connections.").unwrap();
    /// Connections registered as producers.
    pub static ref REGISTERED_PRODUCERS: Gauge =
        register_gauge!("posture_relay_registered_producers", "Number of connections registered as producers.").unwrap();
    /// Connections registered as consumers.
    pub static ref REGISTERED_CONSUMERS: Gauge =
        register_gauge!("posture_relay_registered_consumers", "Number of connections registered as consumers.").unwrap();
    /// Producer/consumer pairs currently active.
    pub static ref ACTIVE_PAIRINGS: Gauge =
        register_gauge!("posture_relay_active_pairings", "Number of active producer/consumer pairings.").unwrap();


    // --- Counters ---
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("posture_relay_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of inbound frames processed.
    pub static ref FRAMES_PROCESSED_TOTAL: Counter =
        register_counter!("posture_relay_frames_processed_total", "Total number of inbound frames processed.").unwrap();
    /// Measurements forwarded to a consumer.
    pub static ref MEASUREMENTS_RELAYED_TOTAL: Counter =
        register_counter!("posture_relay_measurements_relayed_total", "Total number of measurements delivered to a consumer.").unwrap();
    /// Measurements that could not be delivered, labeled by reason.
    pub static ref MEASUREMENTS_DROPPED_TOTAL: CounterVec =
        register_counter_vec!("posture_relay_measurements_dropped_total", "Total number of measurements dropped, labeled by reason.", &["reason"]).unwrap();
    /// Persistence attempts, labeled by outcome.
    pub static ref PERSIST_OUTCOMES_TOTAL: CounterVec =
        register_counter_vec!("posture_relay_persist_outcomes_total", "Total number of persistence attempts, labeled by outcome.", &["outcome"]).unwrap();
    /// Frames rejected as malformed or not allowed.
    pub static ref PROTOCOL_ERRORS_TOTAL: Counter =
        register_counter!("posture_relay_protocol_errors_total", "Total number of inbound frames rejected with an error reply.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
