//! The `network_connections_info` collector.
//!
//! Implements [`prometheus::core::Collector`] so every scrape drives one
//! collection pass and emits a gauge per observed connection, value `1`,
//! with the connection's attributes as labels.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use prometheus::{IntGaugeVec, Opts, core::Desc, proto::MetricFamily};
use tracing::error;

use crate::collector::Collector;

pub const METRIC_NAME: &str = "network_connections_info";
const METRIC_HELP: &str = "Information about network connections";

const LABELS: &[&str] = &[
    "source_address",
    "source_port",
    "destination_address",
    "destination_port",
    "state",
    "interface",
    "protocol",
    "direction",
    "process_name",
];

/// Per-scrape connection gauge.
///
/// Scrapes may arrive concurrently, and a pass mutates the resolver cache,
/// so passes are serialized behind a mutex: one pass at a time, never a
/// torn cache.
pub struct ConnectionsCollector {
    inner: Mutex<Collector>,
    desc: Desc,
}

impl ConnectionsCollector {
    /// # Errors
    ///
    /// Returns [`prometheus::Error`] if the metric descriptor is invalid.
    pub fn new(collector: Collector) -> Result<Self, prometheus::Error> {
        let desc = Desc::new(
            METRIC_NAME.to_owned(),
            METRIC_HELP.to_owned(),
            LABELS.iter().map(|&label| label.to_owned()).collect(),
            HashMap::new(),
        )?;
        Ok(Self {
            inner: Mutex::new(collector),
            desc,
        })
    }
}

impl prometheus::core::Collector for ConnectionsCollector {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let records = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .collect();

        let gauge = match IntGaugeVec::new(Opts::new(METRIC_NAME, METRIC_HELP), LABELS) {
            Ok(gauge) => gauge,
            Err(error) => {
                error!(
                    event.name = "metrics.gauge_build_failed",
                    error = %error,
                    "failed to build connections gauge"
                );
                return Vec::new();
            }
        };

        for record in records {
            gauge
                .with_label_values(&[
                    record.source_address.as_str(),
                    record.source_port.as_str(),
                    record.destination_address.as_str(),
                    record.destination_port.as_str(),
                    record.state.as_str(),
                    record.interface.as_str(),
                    record.protocol.as_str(),
                    record.direction.as_str(),
                    record.process_name.as_str(),
                ])
                .set(1);
        }

        gauge.collect()
    }
}
