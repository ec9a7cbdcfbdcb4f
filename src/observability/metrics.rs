//! Counters and histograms for region calls and gateway synchronization.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding process.

use std::time::Duration;

pub const REGION_REQUESTS_TOTAL: &str = "regionctl_region_requests_total";
pub const REGION_REQUEST_DURATION: &str = "regionctl_region_request_duration_seconds";
pub const POOL_EVICTIONS_TOTAL: &str = "regionctl_pool_evictions_total";
pub const POOL_CLIENTS_CREATED_TOTAL: &str = "regionctl_pool_clients_created_total";
pub const GATEWAY_SYNC_TOTAL: &str = "regionctl_gateway_sync_total";

/// Record one completed region call.
pub fn record_region_request(region: &str, method: &str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(
        REGION_REQUESTS_TOTAL,
        "region" => region.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    metrics::histogram!(
        REGION_REQUEST_DURATION,
        "region" => region.to_string(),
        "method" => method.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_pool_eviction(reason: &'static str) {
    metrics::counter!(POOL_EVICTIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_pool_client_created() {
    metrics::counter!(POOL_CLIENTS_CREATED_TOTAL).increment(1);
}

/// Record the outcome of a gateway engine operation.
pub fn record_gateway_sync(operation: &'static str, outcome: &'static str) {
    metrics::counter!(GATEWAY_SYNC_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
}
