//! One collection pass over the kernel connection tables.
//!
//! A pass is stateless across invocations and single-threaded within one:
//! harvest the listening-port set from the TCP table, re-read the TCP table
//! with that set to classify direction, then read the UDP table. One
//! protocol's unavailability never blocks another's; the caller only
//! observes an empty record set when every table source is unavailable.

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    conn::{
        record::ConnectionRecord,
        state::SocketState,
        table,
    },
    diag::DiagnosticRunner,
    iface::resolver::InterfaceResolver,
    metrics::registry,
    procname::PortProcessMap,
};

/// Connection-table locations, overridable for containers that mount the
/// host's `/proc` somewhere else.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CollectorOptions {
    pub tcp_table: PathBuf,
    pub udp_table: PathBuf,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            tcp_table: PathBuf::from("/proc/net/tcp"),
            udp_table: PathBuf::from("/proc/net/udp"),
        }
    }
}

/// Orchestrator for collection passes.
pub struct Collector {
    options: CollectorOptions,
    resolver: InterfaceResolver,
    runner: Arc<dyn DiagnosticRunner>,
}

impl Collector {
    pub fn new(
        options: CollectorOptions,
        resolver: InterfaceResolver,
        runner: Arc<dyn DiagnosticRunner>,
    ) -> Self {
        Self {
            options,
            resolver,
            runner,
        }
    }

    /// Run one collection pass and return the fresh record set.
    ///
    /// Never fails: unavailable sources and unresolved auxiliary data
    /// degrade to skipped protocols, `unknown` labels, and empty process
    /// names.
    pub fn collect(&mut self) -> Vec<ConnectionRecord> {
        let _timer = registry::PASS_DURATION_SECONDS.start_timer();

        let processes = PortProcessMap::load(self.runner.as_ref());
        let mut records = Vec::new();

        // Direction classification needs the complete listening-port set
        // before any row can be labeled, so a first full read must finish
        // before the second begins.
        let listen_ports = self.harvest_listen_ports(&processes);

        match table::read_tcp(
            &self.options.tcp_table,
            &mut self.resolver,
            Some(&listen_ports),
            &processes,
        ) {
            Ok(rows) => {
                registry::inc_table_read("tcp", "ok");
                records.extend(rows);
            }
            Err(error) => {
                registry::inc_table_read("tcp", "unavailable");
                warn!(
                    event.name = "collector.tcp_unavailable",
                    error = %error,
                    "skipping TCP connections for this pass"
                );
            }
        }

        match table::read_udp(&self.options.udp_table, &mut self.resolver) {
            Ok(rows) => {
                registry::inc_table_read("udp", "ok");
                records.extend(rows);
            }
            Err(error) => {
                registry::inc_table_read("udp", "unavailable");
                warn!(
                    event.name = "collector.udp_unavailable",
                    error = %error,
                    "skipping UDP sockets for this pass"
                );
            }
        }

        debug!(
            event.name = "collector.pass_complete",
            record_count = records.len(),
            listen_port_count = listen_ports.len(),
            "collection pass complete"
        );

        records
    }

    /// First TCP read of the pass, reduced to its LISTEN source ports.
    fn harvest_listen_ports(&mut self, processes: &PortProcessMap) -> HashSet<String> {
        match table::read_tcp(&self.options.tcp_table, &mut self.resolver, None, processes) {
            Ok(rows) => rows
                .into_iter()
                .filter(|record| record.state == SocketState::Listen)
                .map(|record| record.source_port)
                .collect(),
            Err(error) => {
                debug!(
                    event.name = "collector.harvest_failed",
                    error = %error,
                    "listening-port harvest failed, directions may default to outgoing"
                );
                HashSet::new()
            }
        }
    }
}
