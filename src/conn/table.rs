//! Reader for the kernel's per-protocol connection tables.
//!
//! Each read reflects current kernel state at read time: the source is a
//! live kernel-maintained table, so every call produces a fresh record set
//! and no identity persists across calls. Rows that cannot be decoded are
//! skipped; only an unopenable source fails the read.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use thiserror::Error;
use tracing::debug;

use crate::{iface::resolver::InterfaceResolver, procname::PortProcessMap};

use super::{
    addr,
    record::{ConnectionRecord, Direction, Protocol},
    state::SocketState,
};

/// Rows with fewer whitespace-separated fields are malformed and skipped.
const MIN_FIELDS: usize = 10;

const LOCAL_FIELD: usize = 1;
const REMOTE_FIELD: usize = 2;
const STATE_FIELD: usize = 3;

/// The table source could not be read. The caller treats this as "zero
/// connections for this protocol this pass" and continues with other
/// protocols.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection table {path} is unavailable: {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    fn unavailable(path: &Path, source: std::io::Error) -> Self {
        Self::SourceUnavailable {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Read the TCP table.
///
/// With `listen_ports` set, each row's direction is classified against the
/// listening-port set (`incoming` if its source port is a listening port,
/// else `outgoing`) and process names are attached to LISTEN rows and
/// server-side ESTABLISHED rows. Without it, direction is left `unknown`;
/// this form exists for the harvest pass that builds the set in the first
/// place.
///
/// # Errors
///
/// Returns [`SourceError`] if the table cannot be opened or read.
pub fn read_tcp(
    path: &Path,
    resolver: &mut InterfaceResolver,
    listen_ports: Option<&HashSet<String>>,
    processes: &PortProcessMap,
) -> Result<Vec<ConnectionRecord>, SourceError> {
    let mut records = Vec::new();

    for_each_row(path, |fields| {
        let Some((source, destination)) = decode_endpoints(fields, path) else {
            return;
        };
        let (source_address, source_port) = source;
        let (destination_address, destination_port) = destination;

        let state = SocketState::from_tcp_code(fields[STATE_FIELD]);

        let direction = match listen_ports {
            Some(ports) if ports.contains(&source_port) => Direction::Incoming,
            Some(_) => Direction::Outgoing,
            None => Direction::Unknown,
        };

        // Attribution only makes sense for sockets we own the server side
        // of: LISTEN rows, and ESTABLISHED rows on a known listening port.
        let is_listen = state == SocketState::Listen;
        let is_server_established = state == SocketState::Established
            && listen_ports.is_some_and(|ports| ports.contains(&source_port));
        let process_name = if is_listen || is_server_established {
            processes.lookup(&source_port).unwrap_or_default().to_owned()
        } else {
            String::new()
        };

        let interface = resolver.resolve_connection(&source_address, &destination_address);

        records.push(ConnectionRecord {
            source_address,
            source_port,
            destination_address,
            destination_port,
            state,
            protocol: Protocol::Tcp,
            interface,
            direction,
            process_name,
        });
    })?;

    Ok(records)
}

/// Read the UDP table.
///
/// The UDP table has no TCP-style state field, so states are synthesized: a
/// bound local port is `LISTEN`, anything else `UNCONN`. Direction is always
/// `unknown` and no process attribution is attempted.
///
/// # Errors
///
/// Returns [`SourceError`] if the table cannot be opened or read.
pub fn read_udp(
    path: &Path,
    resolver: &mut InterfaceResolver,
) -> Result<Vec<ConnectionRecord>, SourceError> {
    let mut records = Vec::new();

    for_each_row(path, |fields| {
        let Some((source, destination)) = decode_endpoints(fields, path) else {
            return;
        };
        let (source_address, source_port) = source;
        let (destination_address, destination_port) = destination;

        let state = if source_port == "0" {
            SocketState::Unconn
        } else {
            SocketState::Listen
        };

        let interface = resolver.resolve_connection(&source_address, &destination_address);

        records.push(ConnectionRecord {
            source_address,
            source_port,
            destination_address,
            destination_port,
            state,
            protocol: Protocol::Udp,
            interface,
            direction: Direction::Unknown,
            process_name: String::new(),
        });
    })?;

    Ok(records)
}

/// Open the table, discard the header line, and hand each well-formed row's
/// fields to `handle`.
fn for_each_row<F>(path: &Path, mut handle: F) -> Result<(), SourceError>
where
    F: FnMut(&[&str]),
{
    let file = File::open(path).map_err(|e| SourceError::unavailable(path, e))?;
    let reader = BufReader::new(file);

    for (index, line) in reader.lines().enumerate() {
        if index == 0 {
            continue;
        }
        let line = line.map_err(|e| SourceError::unavailable(path, e))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS {
            continue;
        }
        handle(&fields);
    }

    Ok(())
}

/// Decode both endpoint fields, skipping the row on any decode failure.
fn decode_endpoints(
    fields: &[&str],
    path: &Path,
) -> Option<((String, String), (String, String))> {
    let local = match addr::decode_endpoint(fields[LOCAL_FIELD]) {
        Ok(endpoint) => endpoint,
        Err(error) => {
            debug!(
                event.name = "conn.row_skipped",
                table = %path.display(),
                error = %error,
                "skipping row with undecodable local address"
            );
            return None;
        }
    };
    let remote = match addr::decode_endpoint(fields[REMOTE_FIELD]) {
        Ok(endpoint) => endpoint,
        Err(error) => {
            debug!(
                event.name = "conn.row_skipped",
                table = %path.display(),
                error = %error,
                "skipping row with undecodable remote address"
            );
            return None;
        }
    };
    Some((local, remote))
}

#[cfg(test)]
mod tests {
    use std::{io::Write, sync::Arc};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        diag::DiagnosticRunner,
        iface::source::{EnumerationError, Interface, InterfaceSource},
    };

    const ROW_TAIL: &str = "00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0";

    struct FixedSource(Vec<Interface>);

    impl InterfaceSource for FixedSource {
        fn interfaces(&self) -> Result<Vec<Interface>, EnumerationError> {
            Ok(self.0.clone())
        }
    }

    struct NoCommands;

    impl DiagnosticRunner for NoCommands {
        fn run(&self, _program: &str, _args: &[&str]) -> std::io::Result<String> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "unavailable",
            ))
        }
    }

    fn test_resolver() -> InterfaceResolver {
        let eth0 = Interface {
            name: "eth0".to_owned(),
            up: true,
            loopback: false,
            ipv4: vec![
                ipnetwork::Ipv4Network::new("192.168.1.2".parse().unwrap(), 24).unwrap(),
            ],
        };
        InterfaceResolver::new(Box::new(FixedSource(vec![eth0])), Arc::new(NoCommands))
    }

    fn write_table(dir: &TempDir, name: &str, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode"
        )
        .unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        path
    }

    #[test]
    fn decodes_listen_rows_for_loopback_and_wildcard() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            "tcp",
            &[
                &format!("   0: 0100007F:0016 00000000:0000 0A {ROW_TAIL}"),
                &format!("   1: 00000000:0000 00000000:0000 0A {ROW_TAIL}"),
            ],
        );

        let mut resolver = test_resolver();
        let records =
            read_tcp(&path, &mut resolver, None, &PortProcessMap::empty()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_address, "127.0.0.1");
        assert_eq!(records[0].source_port, "22");
        assert_eq!(records[0].state, SocketState::Listen);
        assert_eq!(records[0].interface, "lo");
        assert_eq!(records[1].source_address, "0.0.0.0");
        assert_eq!(records[1].source_port, "0");
        assert_eq!(records[1].state, SocketState::Listen);
    }

    #[test]
    fn classifies_direction_from_listening_ports() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            "tcp",
            &[
                // Server side of an inbound session on :22.
                &format!("   0: 0201A8C0:0016 0301A8C0:D431 01 {ROW_TAIL}"),
                // Client side of an outbound session to 8.8.8.8:443.
                &format!("   1: 0201A8C0:CF84 08080808:01BB 01 {ROW_TAIL}"),
            ],
        );

        let listen_ports: HashSet<String> = ["22".to_owned()].into();
        let mut resolver = test_resolver();
        let records = read_tcp(
            &path,
            &mut resolver,
            Some(&listen_ports),
            &PortProcessMap::empty(),
        )
        .unwrap();

        assert_eq!(records[0].direction, Direction::Incoming);
        assert_eq!(records[1].direction, Direction::Outgoing);
    }

    #[test]
    fn direction_is_unknown_on_harvest_pass() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            "tcp",
            &[&format!("   0: 0201A8C0:0016 0301A8C0:D431 01 {ROW_TAIL}")],
        );

        let mut resolver = test_resolver();
        let records =
            read_tcp(&path, &mut resolver, None, &PortProcessMap::empty()).unwrap();
        assert_eq!(records[0].direction, Direction::Unknown);
    }

    #[test]
    fn skips_short_and_undecodable_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            "tcp",
            &[
                "   0: 0100007F:0016 00000000:0000 0A",
                &format!("   1: ZZZZZZZZ:0016 00000000:0000 0A {ROW_TAIL}"),
                &format!(
                    "   2: 00000000000000000000000001000000:0016 00000000:0000 0A {ROW_TAIL}"
                ),
                &format!("   3: 0100007F:0050 00000000:0000 0A {ROW_TAIL}"),
            ],
        );

        let mut resolver = test_resolver();
        let records =
            read_tcp(&path, &mut resolver, None, &PortProcessMap::empty()).unwrap();

        // Only the last row survives: too few fields, bad hex, and the
        // IPv6 form are each skipped without failing the read.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_port, "80");
    }

    #[test]
    fn synthesizes_udp_states() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            "udp",
            &[
                &format!("   0: 0201A8C0:0035 00000000:0000 07 {ROW_TAIL}"),
                &format!("   1: 00000000:0000 00000000:0000 07 {ROW_TAIL}"),
            ],
        );

        let mut resolver = test_resolver();
        let records = read_udp(&path, &mut resolver).unwrap();

        assert_eq!(records[0].state, SocketState::Listen);
        assert_eq!(records[0].protocol, Protocol::Udp);
        assert_eq!(records[0].direction, Direction::Unknown);
        assert_eq!(records[1].state, SocketState::Unconn);
    }

    #[test]
    fn missing_table_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut resolver = test_resolver();
        let result = read_udp(&dir.path().join("absent"), &mut resolver);
        assert!(matches!(
            result,
            Err(SourceError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn unknown_state_codes_are_emitted_not_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            "tcp",
            &[&format!("   0: 0201A8C0:1F90 0301A8C0:D431 0E {ROW_TAIL}")],
        );

        let mut resolver = test_resolver();
        let records =
            read_tcp(&path, &mut resolver, None, &PortProcessMap::empty()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, SocketState::Unknown);
    }
}
