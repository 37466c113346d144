//! Metrics collection and exposition.
//!
//! # Metrics
//! - `facet_requests_total` (counter): requests by method, status
//! - `facet_request_duration_seconds` (histogram): latency distribution
//! - `facet_cache_lookups_total` (counter): lookups by result (hit, miss)
//! - `facet_cache_stores_total` (counter): entries handed to a backend
//! - `facet_cache_invalidations_total` (counter): deletes and group invalidations
//! - `facet_cache_evictions_total` (counter): LRU evictions
//! - `facet_peer_broadcast_failures_total` (counter): failed peer invalidations
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels limited to bounded sets (method, status, result, kind)

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static DESCRIPTIONS: Once = Once::new();

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    describe_metrics();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    DESCRIPTIONS.call_once(|| {
        describe_counter!("facet_requests_total", Unit::Count, "Requests dispatched, by method and status.");
        describe_histogram!(
            "facet_request_duration_seconds",
            Unit::Seconds,
            "Time from request receipt to committed response."
        );
        describe_counter!("facet_cache_lookups_total", Unit::Count, "Cache lookups, by result.");
        describe_counter!("facet_cache_stores_total", Unit::Count, "Responses stored in the cache.");
        describe_counter!(
            "facet_cache_invalidations_total",
            Unit::Count,
            "Cache deletes and group invalidations, by kind."
        );
        describe_counter!("facet_cache_evictions_total", Unit::Count, "Entries evicted for capacity.");
        describe_counter!(
            "facet_peer_broadcast_failures_total",
            Unit::Count,
            "Invalidations that failed to reach a peer."
        );
    });
}

/// Record a committed response.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!("facet_requests_total", "method" => method.to_string(), "status" => status.to_string()).increment(1);
    histogram!("facet_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("facet_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_store() {
    counter!("facet_cache_stores_total").increment(1);
}

/// `kind` is `delete` or `group`.
pub fn record_cache_invalidation(kind: &'static str) {
    counter!("facet_cache_invalidations_total", "kind" => kind).increment(1);
}

pub fn record_cache_evictions(count: usize) {
    counter!("facet_cache_evictions_total").increment(count as u64);
}

pub fn record_peer_broadcast_failure() {
    counter!("facet_peer_broadcast_failures_total").increment(1);
}
