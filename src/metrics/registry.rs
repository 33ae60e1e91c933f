//! Global metrics registry and operational metric definitions.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry for all sockmon metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total connection-table reads by protocol and outcome.
    /// Labels: protocol = "tcp" | "udp", status = "ok" | "unavailable"
    pub static ref TABLE_READS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("table_reads_total", "Total connection table reads by protocol and outcome")
            .namespace("sockmon")
            .subsystem("collector"),
        &["protocol", "status"]
    ).expect("failed to create collector_table_reads_total metric");

    /// Interface resolutions by the fallback strategy that produced the
    /// answer, plus "unresolved" when the whole chain fell through.
    pub static ref RESOLUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("resolutions_total", "Interface resolutions by winning fallback strategy")
            .namespace("sockmon")
            .subsystem("resolver"),
        &["strategy"]
    ).expect("failed to create resolver_resolutions_total metric");

    /// Wall time of one collection pass, including external command calls.
    pub static ref PASS_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("pass_duration_seconds", "Wall time of one collection pass")
            .namespace("sockmon")
            .subsystem("collector")
    ).expect("failed to create collector_pass_duration_seconds metric");
}

/// Register sockmon's operational metrics with [`struct@REGISTRY`].
///
/// Call once at application startup.
///
/// # Errors
///
/// Returns [`prometheus::Error`] if a collector is registered twice.
pub fn init_registry() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(TABLE_READS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOLUTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PASS_DURATION_SECONDS.clone()))?;
    Ok(())
}

pub fn inc_table_read(protocol: &str, status: &str) {
    TABLE_READS_TOTAL
        .with_label_values(&[protocol, status])
        .inc();
}

pub fn inc_resolution(strategy: &str) {
    RESOLUTIONS_TOTAL.with_label_values(&[strategy]).inc();
}
