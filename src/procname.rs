//! Best-effort attribution of listening ports to process names.
//!
//! Built once per collection pass from `ss -tulnp`. Attribution is
//! advisory: absence of the command, or any parse failure, degrades
//! silently to an empty map and never affects the rest of the record.

use std::collections::HashMap;

use tracing::debug;

use crate::diag::{self, DiagnosticRunner, SS_COMMAND_PATHS};

/// Map from listening port (decimal string) to owning process name.
#[derive(Debug, Default)]
pub struct PortProcessMap {
    by_port: HashMap<String, String>,
}

impl PortProcessMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the map from the socket-listing command, degrading to empty
    /// on any failure.
    pub fn load(runner: &dyn DiagnosticRunner) -> Self {
        match diag::run_first(runner, SS_COMMAND_PATHS, &["-tulnp"]) {
            Some(output) => {
                let by_port = parse_socket_listing(&output);
                debug!(
                    event.name = "procname.loaded",
                    port_count = by_port.len(),
                    "built port to process map"
                );
                Self { by_port }
            }
            None => {
                debug!(
                    event.name = "procname.unavailable",
                    "socket listing command unavailable, process names will be empty"
                );
                Self::empty()
            }
        }
    }

    pub fn lookup(&self, port: &str) -> Option<&str> {
        self.by_port.get(port).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }
}

/// Parse `ss -tulnp` output.
///
/// Columns: `Netid State Recv-Q Send-Q Local:Port Peer:Port Process`. Only
/// LISTEN sockets with a `users:((…))` annotation contribute an entry.
fn parse_socket_listing(output: &str) -> HashMap<String, String> {
    let mut by_port = HashMap::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }
        if fields[1] != "LISTEN" {
            continue;
        }
        let Some(annotation) = fields.last().filter(|f| f.contains("users:(")) else {
            continue;
        };
        let Some(name) = extract_process_name(annotation) else {
            continue;
        };
        let Some(port) = extract_port(fields[4]) else {
            continue;
        };
        by_port.insert(port.to_owned(), name);
    }

    by_port
}

/// First process name inside the `users:(("name",pid=…,fd=…))` annotation,
/// with surrounding punctuation and quoting stripped.
fn extract_process_name(annotation: &str) -> Option<String> {
    let start = annotation.find('(')?;
    let end = annotation.find(')')?;
    if end <= start {
        return None;
    }
    let details = &annotation[start + 1..end];
    let first = details.split(',').next()?;
    let name = first
        .trim_matches(|c| "()[]{} ".contains(c))
        .replace('"', "");
    (!name.is_empty()).then_some(name)
}

/// Trailing port from the local-address column; handles `*:22`,
/// `0.0.0.0:22` and `[::]:22` forms alike.
fn extract_port(local: &str) -> Option<&str> {
    let (_, port) = local.rsplit_once(':')?;
    (!port.is_empty()).then_some(port)
}
