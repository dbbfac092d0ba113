use dashcam_core::SkipReason;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_INIT: OnceLock<()> = OnceLock::new();

pub fn init_metrics() {
    METRICS_INIT.get_or_init(|| {
        describe_counter!("ticks_total", "Capture ticks that ran to an outcome");
        describe_counter!("photos_persisted_total", "Photos written into a session");
        describe_counter!("ticks_skipped_total", "Ticks that persisted nothing, by reason");
        describe_counter!("exports_total", "Session bundles exported");
        describe_gauge!("capture_active", "1 while the capture loop is active");
    });
}

/// Install the Prometheus recorder; the handle renders `/metrics`.
pub fn install_exporter() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

pub fn record_persisted() {
    counter!("ticks_total").increment(1);
    counter!("photos_persisted_total").increment(1);
}

pub fn record_skipped(reason: SkipReason) {
    counter!("ticks_total").increment(1);
    counter!("ticks_skipped_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_export() {
    counter!("exports_total").increment(1);
}

pub fn set_capture_active(active: bool) {
    gauge!("capture_active").set(if active { 1.0 } else { 0.0 });
}
