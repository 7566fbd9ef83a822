//! Prometheus metrics collection for collabd (spec §10.5).
//!
//! Exposed over HTTP on `/metrics` via `axum`, mirroring the teacher's
//! `http.rs` + `metrics.rs` pair.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Rooms currently held in memory.
    pub static ref ACTIVE_ROOMS: IntGauge = IntGauge::new(
        "collabd_active_rooms",
        "Rooms currently held in memory"
    ).unwrap();

    /// Connections currently attached across all rooms.
    pub static ref CONNECTED_CLIENTS: IntGauge = IntGauge::new(
        "collabd_connected_clients",
        "Connections currently attached across all rooms"
    ).unwrap();

    /// Ops successfully applied to a room's CRDT tree.
    pub static ref OPS_APPLIED: IntCounter = IntCounter::new(
        "collabd_ops_applied_total",
        "Ops successfully applied to a room's CRDT tree"
    ).unwrap();

    /// Ops dropped for any reason (stale clock, bad path, schema violation).
    pub static ref OPS_DROPPED: IntCounter = IntCounter::new(
        "collabd_ops_dropped_total",
        "Ops dropped instead of applied"
    ).unwrap();

    /// Durability flushes that completed successfully.
    pub static ref DURABILITY_FLUSH_SUCCESS: IntCounter = IntCounter::new(
        "collabd_durability_flush_success_total",
        "Durability flushes that completed successfully"
    ).unwrap();

    /// Durability flushes that failed (room continues in-memory, spec §7).
    pub static ref DURABILITY_FLUSH_FAILURE: IntCounter = IntCounter::new(
        "collabd_durability_flush_failure_total",
        "Durability flushes that failed"
    ).unwrap();

    /// Connections dropped for transport backpressure (spec §7).
    pub static ref BACKPRESSURE_DROPPED: IntCounter = IntCounter::new(
        "collabd_backpressure_dropped_total",
        "Connections dropped because their send queue was full"
    ).unwrap();

    /// Connections closed for sending an unparseable envelope (spec §7
    /// `MalformedEnvelope` — the one error kind that terminates a connection).
    pub static ref MALFORMED_ENVELOPES: IntCounter = IntCounter::new(
        "collabd_malformed_envelopes_total",
        "Connections closed after sending an envelope that failed to parse"
    ).unwrap();
}

/// Register every metric. Must run once at startup before any are recorded.
pub fn init() {
    REGISTRY.register(Box::new(ACTIVE_ROOMS.clone())).unwrap();
    REGISTRY
        .register(Box::new(CONNECTED_CLIENTS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(OPS_APPLIED.clone())).unwrap();
    REGISTRY.register(Box::new(OPS_DROPPED.clone())).unwrap();
    REGISTRY
        .register(Box::new(DURABILITY_FLUSH_SUCCESS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(DURABILITY_FLUSH_FAILURE.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(BACKPRESSURE_DROPPED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(MALFORMED_ENVELOPES.clone()))
        .unwrap();
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
