//! End-to-end collection passes against a synthetic proc tree, a fixed
//! interface topology, and canned diagnostic-command output.

use std::{io, io::Write, path::PathBuf, sync::Arc};

use tempfile::TempDir;

use sockmon::{
    collector::{Collector, CollectorOptions},
    conn::{Direction, Protocol, SocketState},
    diag::DiagnosticRunner,
    iface::{
        resolver::InterfaceResolver,
        source::{EnumerationError, Interface, InterfaceSource},
    },
};

const ROW_TAIL: &str =
    "00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0";

const SS_OUTPUT: &str = "\
Netid State  Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
tcp   LISTEN 0      128          0.0.0.0:22         0.0.0.0:*     users:((\"sshd\",pid=890,fd=3))
";

#[derive(Clone)]
struct FixedSource(Vec<Interface>);

impl InterfaceSource for FixedSource {
    fn interfaces(&self) -> Result<Vec<Interface>, EnumerationError> {
        Ok(self.0.clone())
    }
}

struct CannedRunner;

impl DiagnosticRunner for CannedRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        if program == "ss" && args == ["-tulnp"] {
            return Ok(SS_OUTPUT.to_owned());
        }
        Err(io::Error::new(io::ErrorKind::NotFound, "unavailable"))
    }
}

fn network(addr: &str, prefix: u8) -> ipnetwork::Ipv4Network {
    ipnetwork::Ipv4Network::new(addr.parse().unwrap(), prefix).unwrap()
}

fn topology() -> FixedSource {
    FixedSource(vec![
        Interface {
            name: "eth0".to_owned(),
            up: true,
            loopback: false,
            ipv4: vec![network("192.168.1.2", 24)],
        },
        Interface {
            name: "bond0".to_owned(),
            up: true,
            loopback: false,
            ipv4: vec![network("10.1.0.5", 24)],
        },
    ])
}

fn write_table(dir: &TempDir, name: &str, rows: &[String]) -> PathBuf {
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

fn tcp_rows() -> Vec<String> {
    vec![
        // 0.0.0.0:22 wildcard listener
        format!("   0: 00000000:0016 00000000:0000 0A {ROW_TAIL}"),
        // 192.168.1.2:22 <- 192.168.1.3:54321, server side
        format!("   1: 0201A8C0:0016 0301A8C0:D431 01 {ROW_TAIL}"),
        // 192.168.1.2:53124 -> 8.8.8.8:443, client side
        format!("   2: 0201A8C0:CF84 08080808:01BB 01 {ROW_TAIL}"),
        // loopback chatter on 5432
        format!("   3: 0100007F:1538 0100007F:A1B2 01 {ROW_TAIL}"),
    ]
}

fn udp_rows() -> Vec<String> {
    vec![
        // 192.168.1.2:53 bound socket
        format!("   0: 0201A8C0:0035 00000000:0000 07 {ROW_TAIL}"),
        // unbound socket
        format!("   1: 00000000:0000 00000000:0000 07 {ROW_TAIL}"),
    ]
}

fn collector(tcp_table: PathBuf, udp_table: PathBuf) -> Collector {
    let runner: Arc<dyn DiagnosticRunner> = Arc::new(CannedRunner);
    let resolver = InterfaceResolver::new(Box::new(topology()), Arc::clone(&runner));
    Collector::new(
        CollectorOptions {
            tcp_table,
            udp_table,
        },
        resolver,
        runner,
    )
}

#[test]
fn full_pass_decodes_classifies_and_attributes() {
    let dir = TempDir::new().unwrap();
    let tcp = write_table(&dir, "tcp", &tcp_rows());
    let udp = write_table(&dir, "udp", &udp_rows());

    let mut collector = collector(tcp, udp);
    let records = collector.collect();
    assert_eq!(records.len(), 6);

    let wildcard = &records[0];
    assert_eq!(wildcard.source_address, "0.0.0.0");
    assert_eq!(wildcard.source_port, "22");
    assert_eq!(wildcard.state, SocketState::Listen);
    // Wildcard listeners are attributed to the computed primary interface,
    // and bonding interfaces outrank ethernet ones.
    assert_eq!(wildcard.interface, "bond0");
    assert_eq!(wildcard.direction, Direction::Incoming);
    assert_eq!(wildcard.process_name, "sshd");

    let inbound = &records[1];
    assert_eq!(inbound.source_address, "192.168.1.2");
    assert_eq!(inbound.state, SocketState::Established);
    assert_eq!(inbound.direction, Direction::Incoming);
    assert_eq!(inbound.interface, "eth0");
    assert_eq!(inbound.process_name, "sshd");

    let outbound = &records[2];
    assert_eq!(outbound.source_port, "53124");
    assert_eq!(outbound.destination_address, "8.8.8.8");
    assert_eq!(outbound.destination_port, "443");
    assert_eq!(outbound.direction, Direction::Outgoing);
    assert_eq!(outbound.process_name, "");

    let loopback = &records[3];
    assert_eq!(loopback.interface, "lo");

    let udp_bound = &records[4];
    assert_eq!(udp_bound.protocol, Protocol::Udp);
    assert_eq!(udp_bound.source_port, "53");
    assert_eq!(udp_bound.state, SocketState::Listen);
    assert_eq!(udp_bound.direction, Direction::Unknown);
    assert_eq!(udp_bound.interface, "eth0");

    let udp_unbound = &records[5];
    assert_eq!(udp_unbound.state, SocketState::Unconn);
    assert_eq!(udp_unbound.direction, Direction::Unknown);
}

#[test]
fn missing_tcp_table_still_yields_udp_records() {
    let dir = TempDir::new().unwrap();
    let udp = write_table(&dir, "udp", &udp_rows());

    let mut collector = collector(dir.path().join("absent_tcp"), udp);
    let records = collector.collect();

    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.protocol == Protocol::Udp));
}

#[test]
fn missing_udp_table_still_yields_tcp_records() {
    let dir = TempDir::new().unwrap();
    let tcp = write_table(&dir, "tcp", &tcp_rows());

    let mut collector = collector(tcp, dir.path().join("absent_udp"));
    let records = collector.collect();

    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.protocol == Protocol::Tcp));
}

#[test]
fn all_tables_missing_yields_empty_set() {
    let dir = TempDir::new().unwrap();
    let mut collector = collector(
        dir.path().join("absent_tcp"),
        dir.path().join("absent_udp"),
    );
    assert!(collector.collect().is_empty());
}

#[test]
fn consecutive_passes_agree_on_primary_interface() {
    let dir = TempDir::new().unwrap();
    let rows = vec![format!("   0: 00000000:0016 00000000:0000 0A {ROW_TAIL}")];
    let tcp = write_table(&dir, "tcp", &rows);
    let udp = write_table(&dir, "udp", &[]);

    let mut collector = collector(tcp, udp);
    let first = collector.collect();
    let second = collector.collect();

    assert_eq!(first[0].interface, "bond0");
    assert_eq!(first[0].interface, second[0].interface);
}

#[test]
fn secondary_ips_share_one_interface_label() {
    let dir = TempDir::new().unwrap();
    let rows = vec![
        // 192.168.10.4:8080 and 192.168.20.4:8080, both bound to bond0
        format!("   0: 040AA8C0:1F90 00000000:0000 0A {ROW_TAIL}"),
        format!("   1: 0414A8C0:1F90 00000000:0000 0A {ROW_TAIL}"),
    ];
    let tcp = write_table(&dir, "tcp", &rows);
    let udp = write_table(&dir, "udp", &[]);

    let runner: Arc<dyn DiagnosticRunner> = Arc::new(CannedRunner);
    let source = FixedSource(vec![Interface {
        name: "bond0".to_owned(),
        up: true,
        loopback: false,
        ipv4: vec![network("192.168.10.4", 24), network("192.168.20.4", 24)],
    }]);
    let resolver = InterfaceResolver::new(Box::new(source), Arc::clone(&runner));
    let mut collector = Collector::new(
        CollectorOptions {
            tcp_table: tcp,
            udp_table: udp,
        },
        resolver,
        runner,
    );

    let records = collector.collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.interface == "bond0"));
}
