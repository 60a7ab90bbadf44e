use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "relay_cache_hits_total",
            "Cache lookups answered without touching a source."
        );
        describe_counter!(
            "relay_cache_misses_total",
            "Cache lookups that fell through to a fetch."
        );
        describe_counter!(
            "relay_mirror_errors_total",
            "Failed upstream mirror/endpoint requests."
        );
        describe_counter!("relay_checks_total", "Account checks performed.");
        describe_counter!(
            "relay_notifications_total",
            "Posts relayed into the operator chat."
        );
        describe_counter!(
            "relay_fetch_failures_total",
            "Checks for which every source and retry failed."
        );
        describe_counter!(
            "relay_source_items_total",
            "Items parsed out of upstream payloads."
        );
        describe_histogram!(
            "relay_source_parse_ms",
            "Upstream payload parse time in milliseconds."
        );
        describe_gauge!("relay_cache_ttl_ms", "Configured response cache TTL.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize Prometheus recorder and expose a static gauge for the cache TTL.
    pub fn init(cache_ttl_ms: u64) -> Self {
        // Use default buckets to avoid API differences across crate versions.
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_metrics_described();

        // Static gauge with current TTL (absolute TTL, no sliding refresh)
        gauge!("relay_cache_ttl_ms").set(cache_ttl_ms as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
