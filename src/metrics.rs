//! Operation counters.
//!
//! Counters go through the `metrics` facade; nothing is exported unless the
//! application installs a recorder (e.g. a Prometheus exporter).

/// Counts a store operation. `store` is the store's [`name`](crate::store::Store::name).
pub fn record_operation(store: &'static str, op: &'static str) {
    ::metrics::counter!("stowage_operations_total", "store" => store, "op" => op).increment(1);
}

/// Counts a cache decorator lookup against one of its layers.
pub fn record_cache_lookup(layer: &'static str, result: &'static str) {
    ::metrics::counter!(
        "stowage_cache_lookups_total",
        "layer" => layer,
        "result" => result
    )
    .increment(1);
}
