//! Symbolic socket states for the kernel's numeric state codes.

use std::fmt;

/// Canonical socket state used as a metric label value.
///
/// TCP states come from the table's two-digit hex state field. UDP tables
/// carry no usable state field, so UDP states are synthesized: a bound
/// local port is reported as `LISTEN`, anything else as `UNCONN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    Unconn,
    Unknown,
}

impl SocketState {
    /// Map a two-digit hex state code from the TCP table.
    ///
    /// Codes outside the defined set map to [`SocketState::Unknown`]; this
    /// is not an error, the row is still emitted with the ambiguous state
    /// as its label value.
    pub fn from_tcp_code(code: &str) -> Self {
        match code {
            "01" => Self::Established,
            "02" => Self::SynSent,
            "03" => Self::SynRecv,
            "04" => Self::FinWait1,
            "05" => Self::FinWait2,
            "06" => Self::TimeWait,
            "07" => Self::Close,
            "08" => Self::CloseWait,
            "09" => Self::LastAck,
            "0A" => Self::Listen,
            "0B" => Self::Closing,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Established => "ESTABLISHED",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::FinWait1 => "FIN_WAIT1",
            Self::FinWait2 => "FIN_WAIT2",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::Listen => "LISTEN",
            Self::Closing => "CLOSING",
            Self::Unconn => "UNCONN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
