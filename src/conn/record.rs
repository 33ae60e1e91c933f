//! Connection records and their label-value enums.

use super::state::SocketState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Heuristic traffic direction derived from the listening-port set.
///
/// A TCP connection whose source port is a known listening port is
/// `incoming`, otherwise `outgoing`. UDP rows are always `unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Unknown => "unknown",
        }
    }
}

/// One observed socket entry, constructed fresh on every collection pass
/// and never mutated after creation. Two passes produce independent record
/// sets even for the same underlying socket.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub source_address: String,
    pub source_port: String,
    pub destination_address: String,
    pub destination_port: String,
    pub state: SocketState,
    pub protocol: Protocol,
    /// Resolved interface name, or `unknown` when resolution degraded.
    pub interface: String,
    pub direction: Direction,
    /// Best-effort process attribution; empty when unavailable.
    pub process_name: String,
}
