use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and hand back the scrape handle.
///
/// Must run before any metric is recorded; later calls return a fresh handle
/// without replacing the recorder already installed.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    match builder.install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder already installed, reusing");
            PrometheusBuilder::new()
                .build_recorder()
                .handle()
        }
    }
}
