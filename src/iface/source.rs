//! Live interface enumeration behind an injectable trait.

use ipnetwork::Ipv4Network;
use nix::{ifaddrs, net::if_::InterfaceFlags};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnumerationError {
    /// The enumeration syscall rejected the address family. Observed on
    /// some kernels and containers; callers fall back to external tooling.
    #[error("address family not supported by interface enumeration: {0}")]
    AddressFamily(#[source] nix::Error),

    /// Any other enumeration failure.
    #[error("failed to enumerate network interfaces: {0}")]
    Enumeration(#[source] nix::Error),
}

impl EnumerationError {
    /// Whether the failure is the protocol-family class that warrants
    /// falling back to an external address-listing command.
    pub fn is_address_family(&self) -> bool {
        matches!(self, Self::AddressFamily(_))
    }
}

/// One enumerated interface with its IPv4 bindings.
///
/// `ipv4` carries every bound address together with its netmask-derived
/// subnet; more than one entry is a valid secondary-IP configuration.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub up: bool,
    pub loopback: bool,
    pub ipv4: Vec<Ipv4Network>,
}

impl Interface {
    /// Whether the interface carries at least one usable IPv4 address.
    pub fn has_ipv4(&self) -> bool {
        self.ipv4.iter().any(|net| !net.ip().is_loopback())
    }
}

/// Source of the current interface topology. Injectable so tests can
/// substitute a fixed topology without touching live system state.
pub trait InterfaceSource: Send + Sync {
    /// Enumerate all interfaces with their IPv4 address bindings.
    ///
    /// # Errors
    ///
    /// Returns [`EnumerationError`] when the underlying query fails; an
    /// interface with no IPv4 addresses is not an error.
    fn interfaces(&self) -> Result<Vec<Interface>, EnumerationError>;
}

/// Enumeration via `getifaddrs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysInterfaceSource;

impl InterfaceSource for SysInterfaceSource {
    fn interfaces(&self) -> Result<Vec<Interface>, EnumerationError> {
        let entries = ifaddrs::getifaddrs().map_err(|errno| match errno {
            nix::errno::Errno::EAFNOSUPPORT => EnumerationError::AddressFamily(errno),
            other => EnumerationError::Enumeration(other),
        })?;

        // getifaddrs yields one entry per (interface, address) pair; fold
        // them into one Interface per name.
        let mut interfaces: Vec<Interface> = Vec::new();
        for entry in entries {
            let index = match interfaces
                .iter()
                .position(|iface| iface.name == entry.interface_name)
            {
                Some(index) => index,
                None => {
                    interfaces.push(Interface {
                        name: entry.interface_name.clone(),
                        up: entry.flags.contains(InterfaceFlags::IFF_UP),
                        loopback: entry.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                        ipv4: Vec::new(),
                    });
                    interfaces.len() - 1
                }
            };

            let (Some(address), Some(netmask)) = (entry.address, entry.netmask) else {
                continue;
            };
            let (Some(address), Some(netmask)) =
                (address.as_sockaddr_in(), netmask.as_sockaddr_in())
            else {
                // Non-IPv4 families (packet, IPv6) are skipped.
                continue;
            };
            if let Ok(network) = Ipv4Network::with_netmask(address.ip(), netmask.ip()) {
                interfaces[index].ipv4.push(network);
            }
        }

        Ok(interfaces)
    }
}
