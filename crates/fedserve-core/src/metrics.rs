//! Metrics for the connection pool and the result cache.
//!
//! Recording goes through the `metrics` facade. Without an installed recorder
//! every call is a no-op, so library users pay nothing unless the gateway
//! installs an exporter.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    // Connection pool metrics
    pub const POOL_CHANNELS: &str = "fedserve_pool_channels";
    pub const POOL_CHANNELS_CREATED_TOTAL: &str = "fedserve_pool_channels_created_total";
    pub const POOL_UNHEALTHY_CHANNELS_TOTAL: &str = "fedserve_pool_unhealthy_channels_total";
    pub const POOL_SCALER_ERRORS_TOTAL: &str = "fedserve_pool_scaler_errors_total";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "fedserve_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "fedserve_cache_misses_total";
    pub const CACHE_REJECTED_TOTAL: &str = "fedserve_cache_rejected_total";
}

// =============================================================================
// Pool Metrics
// =============================================================================

pub fn record_channel_created(endpoint: &str) {
    counter!(names::POOL_CHANNELS_CREATED_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

pub fn set_pool_channels(endpoint: &str, count: usize) {
    gauge!(names::POOL_CHANNELS, "endpoint" => endpoint.to_string()).set(count as f64);
}

pub fn record_unhealthy_channel(endpoint: &str, state: &'static str) {
    counter!(
        names::POOL_UNHEALTHY_CHANNELS_TOTAL,
        "endpoint" => endpoint.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_scaler_error(endpoint: &str) {
    counter!(names::POOL_SCALER_ERRORS_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit. `tier` is `"local"` or `"shared"`.
pub fn record_cache_hit(category: &'static str, tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "category" => category, "tier" => tier).increment(1);
}

pub fn record_cache_miss(category: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "category" => category).increment(1);
}

/// Record a result refused by the admission policy.
pub fn record_cache_rejected(category: &'static str, retcode: i32) {
    counter!(
        names::CACHE_REJECTED_TOTAL,
        "category" => category,
        "retcode" => retcode.to_string()
    )
    .increment(1);
}
