//! Interface resolution: mapping IP addresses to interface names.
//!
//! The resolver answers "which interface owns source-IP X" with the best
//! available fidelity, layering fallbacks for the conditions that break the
//! straightforward answer: several IPs bound to one interface, bonded and
//! virtual interfaces, wildcard-bound sockets, and kernels that reject the
//! enumeration syscall outright.

pub mod resolver;
pub mod source;

pub use resolver::{InterfaceResolver, Strategy, UNKNOWN_INTERFACE};
pub use source::{EnumerationError, Interface, InterfaceSource, SysInterfaceSource};
