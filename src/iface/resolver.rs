//! IP-to-interface resolution with layered fallbacks.
//!
//! The happy path is a cache built from one enumeration pass over the live
//! interfaces. Everything else here exists to keep labels meaningful when
//! that pass is incomplete or impossible: the cache is rebuilt in full on a
//! miss (interfaces come and go at runtime, containers especially), misses
//! after a rebuild try subnet containment, outbound connections may consult
//! the routing table, and wildcard-bound sockets are attributed to a
//! computed primary interface.
//!
//! When the enumeration syscall itself fails with a protocol-family error,
//! the resolver parses `ip -4 addr show` instead, and as a last resort falls
//! back to a hardcoded bridge-range mapping plus a default-route guess. The
//! last resort keeps the service alive with degraded labels; it is never
//! routing-accurate.
//!
//! No resolution path may terminate a collection pass. Failures log and
//! degrade to [`UNKNOWN_INTERFACE`].

use std::{collections::HashMap, fs, net::Ipv4Addr, path::Path, str::FromStr, sync::Arc};

use tracing::{debug, trace, warn};

use crate::{
    diag::{self, DiagnosticRunner, IP_COMMAND_PATHS},
    metrics::registry,
};

use super::source::{EnumerationError, Interface, InterfaceSource};

/// Sentinel label for addresses no strategy could attribute.
pub const UNKNOWN_INTERFACE: &str = "unknown";

const LOOPBACK_INTERFACE: &str = "lo";

/// Where the kernel exposes bonding topology, read for diagnostics when a
/// bonding interface is retained.
const BONDING_DIR: &str = "/proc/net/bonding";

/// Fallback strategies for resolving a source address, evaluated in order.
/// Each strategy runs at most once per connection; the chain never recurses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exact match against the cached IP→interface map.
    CacheLookup,
    /// Rebuild the cache in full and retry the exact match, tolerating
    /// interfaces added or removed since the last build.
    RebuildCache,
    /// Containment check against every live interface's advertised subnet.
    SubnetMatch,
    /// Ask the routing table which interface reaches the destination; only
    /// consulted for outbound connections to non-local addresses.
    RouteLookup,
    /// Attribute to the computed primary interface.
    PrimaryInterface,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheLookup => "cache",
            Self::RebuildCache => "rebuild",
            Self::SubnetMatch => "subnet",
            Self::RouteLookup => "route",
            Self::PrimaryInterface => "primary",
        }
    }
}

/// The precedence of the fallback chain, as data.
pub const FALLBACK_ORDER: &[Strategy] = &[
    Strategy::CacheLookup,
    Strategy::RebuildCache,
    Strategy::SubnetMatch,
    Strategy::RouteLookup,
    Strategy::PrimaryInterface,
];

/// Resolver owning the IP→interface cache.
///
/// The cache is re-derivable at any time from system state and is never a
/// source of truth: a given IP maps to at most one interface per build, and
/// an interface presenting several IPs gets one entry per IP.
pub struct InterfaceResolver {
    source: Box<dyn InterfaceSource>,
    runner: Arc<dyn DiagnosticRunner>,
    cache: Option<HashMap<String, String>>,
    /// Default-route interface adopted during last-resort fallback, used
    /// when primary-interface enumeration is also unavailable.
    primary_hint: Option<String>,
}

impl InterfaceResolver {
    pub fn new(source: Box<dyn InterfaceSource>, runner: Arc<dyn DiagnosticRunner>) -> Self {
        Self {
            source,
            runner,
            cache: None,
            primary_hint: None,
        }
    }

    /// Resolve the interface label for a connection from both endpoints.
    pub fn resolve_connection(&mut self, source_ip: &str, destination_ip: &str) -> String {
        // Loopback on either end short-circuits all other logic.
        if source_ip == "127.0.0.1" || destination_ip == "127.0.0.1" {
            return LOOPBACK_INTERFACE.to_owned();
        }

        if destination_ip == "0.0.0.0" {
            // Listener rows have no remote endpoint to consult.
            if source_ip == "0.0.0.0" {
                let primary = self.primary_interface();
                trace!(
                    event.name = "iface.wildcard_listener",
                    network.interface.name = %primary,
                    "wildcard listener mapped to primary interface"
                );
                return primary;
            }
            return self.resolve_source(source_ip, None);
        }

        self.resolve_source(source_ip, Some(destination_ip))
    }

    /// Walk [`FALLBACK_ORDER`] for a concrete source address.
    fn resolve_source(&mut self, ip: &str, destination: Option<&str>) -> String {
        for strategy in FALLBACK_ORDER {
            let resolved = match strategy {
                Strategy::CacheLookup => self.cache_lookup(ip),
                Strategy::RebuildCache => {
                    self.rebuild_cache();
                    self.cache_lookup(ip)
                }
                Strategy::SubnetMatch => self.subnet_match(ip),
                Strategy::RouteLookup => destination
                    .filter(|dest| !is_local_address(dest))
                    .and_then(|dest| self.route_lookup(dest)),
                Strategy::PrimaryInterface => Some(self.primary_interface()),
            };

            if let Some(name) = resolved
                && name != UNKNOWN_INTERFACE
            {
                registry::inc_resolution(strategy.as_str());
                return name;
            }
        }

        debug!(
            event.name = "iface.unresolved",
            network.peer.address = %ip,
            "no strategy resolved the address"
        );
        registry::inc_resolution("unresolved");
        UNKNOWN_INTERFACE.to_owned()
    }

    fn cache_lookup(&mut self, ip: &str) -> Option<String> {
        if self.cache.is_none() {
            self.rebuild_cache();
        }
        self.cache.as_ref()?.get(ip).cloned()
    }

    /// Build the IP→interface map from live enumeration, falling back to
    /// external tooling when the kernel rejects the query.
    fn rebuild_cache(&mut self) {
        let map = match self.enumerate_map() {
            Ok(map) => map,
            Err(error) if error.is_address_family() => {
                warn!(
                    event.name = "iface.enumeration_unsupported",
                    error = %error,
                    "falling back to external address listing"
                );
                self.command_map()
            }
            Err(error) => {
                warn!(
                    event.name = "iface.enumeration_failed",
                    error = %error,
                    "interface enumeration failed; labels will degrade"
                );
                HashMap::new()
            }
        };

        if map.is_empty() {
            warn!(
                event.name = "iface.cache_empty",
                "no usable interface addresses found, interface detection may be limited"
            );
        } else {
            debug!(
                event.name = "iface.cache_rebuilt",
                entry_count = map.len(),
                "rebuilt IP to interface cache"
            );
        }
        self.cache = Some(map);
    }

    fn enumerate_map(&self) -> Result<HashMap<String, String>, EnumerationError> {
        let mut map = HashMap::new();
        for iface in self.source.interfaces()? {
            if !retained(&iface) {
                continue;
            }
            if iface.name.starts_with("bond") {
                log_bonding_slaves(&iface.name);
            }
            for network in &iface.ipv4 {
                let ip = network.ip();
                if ip.is_loopback() || ip.is_unspecified() {
                    continue;
                }
                // Several addresses on one interface is a valid secondary-IP
                // configuration; each maps individually to the name.
                map.insert(ip.to_string(), iface.name.clone());
            }
        }
        Ok(map)
    }

    /// Parse `ip -4 addr show`, tried across well-known install paths.
    fn command_map(&mut self) -> HashMap<String, String> {
        match diag::run_first(self.runner.as_ref(), IP_COMMAND_PATHS, &["-4", "addr", "show"]) {
            Some(output) => {
                let map = parse_address_listing(&output);
                debug!(
                    event.name = "iface.address_listing_parsed",
                    entry_count = map.len(),
                    "built cache from external address listing"
                );
                map
            }
            None => {
                warn!(
                    event.name = "iface.address_listing_unavailable",
                    "address listing command unavailable, using hardcoded defaults"
                );
                self.fallback_defaults()
            }
        }
    }

    /// Last resort: common libvirt bridge ranges plus the default-route
    /// interface as a primary hint. Exists purely to keep the service alive
    /// with degraded labels.
    fn fallback_defaults(&mut self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("172.16.10.1".to_owned(), "virbr2".to_owned());
        map.insert("192.168.100.1".to_owned(), "virbr1".to_owned());

        if let Some(output) =
            diag::run_first(self.runner.as_ref(), IP_COMMAND_PATHS, &["route", "show", "default"])
            && let Some(iface) = parse_default_route(&output)
        {
            debug!(
                event.name = "iface.fallback_primary",
                network.interface.name = %iface,
                "default route interface adopted as primary hint"
            );
            self.primary_hint = Some(iface);
        }

        map
    }

    /// Check whether the address falls inside any live interface's
    /// advertised subnet.
    fn subnet_match(&self, ip: &str) -> Option<String> {
        let target = Ipv4Addr::from_str(ip).ok()?;
        let interfaces = self.source.interfaces().ok()?;
        interfaces
            .iter()
            .filter(|iface| iface.up && !iface.loopback)
            .find(|iface| iface.ipv4.iter().any(|net| net.contains(target)))
            .map(|iface| iface.name.clone())
    }

    /// Ask the routing table which interface would reach `destination`.
    fn route_lookup(&self, destination: &str) -> Option<String> {
        let output = diag::run_first(
            self.runner.as_ref(),
            IP_COMMAND_PATHS,
            &["route", "get", destination],
        )?;
        parse_route_device(&output)
    }

    /// Interface representing wildcard-bound sockets, by fixed priority:
    /// bonding interfaces first (typically primary in enterprise setups),
    /// then ethernet-named interfaces, then any up non-loopback interface.
    /// Only interfaces carrying at least one IPv4 address are eligible.
    pub fn primary_interface(&mut self) -> String {
        let interfaces = match self.source.interfaces() {
            Ok(interfaces) => interfaces,
            Err(error) => {
                debug!(
                    event.name = "iface.primary_enumeration_failed",
                    error = %error,
                    "enumeration unavailable for primary selection"
                );
                return self
                    .primary_hint
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_INTERFACE.to_owned());
            }
        };

        let eligible =
            |iface: &&Interface| iface.up && !iface.loopback && iface.has_ipv4();

        if let Some(bond) = interfaces
            .iter()
            .filter(eligible)
            .find(|iface| iface.name.starts_with("bond"))
        {
            trace!(
                event.name = "iface.primary_selected",
                network.interface.name = %bond.name,
                "selected bonding interface as primary"
            );
            return bond.name.clone();
        }

        if let Some(ethernet) = interfaces
            .iter()
            .filter(eligible)
            .find(|iface| iface.name.starts_with("eth") || iface.name.starts_with("en"))
        {
            return ethernet.name.clone();
        }

        if let Some(first) = interfaces.iter().find(eligible) {
            return first.name.clone();
        }

        UNKNOWN_INTERFACE.to_owned()
    }
}

/// Interface filter for cache building. Container veth pairs and docker
/// bridges churn constantly and rarely carry addressed production traffic;
/// virtual-bridge (`virbr`) and bonding interfaces commonly do, so they
/// stay.
fn retained(iface: &Interface) -> bool {
    if !iface.up || iface.loopback {
        return false;
    }
    let name = iface.name.as_str();
    if name.contains("docker") {
        return false;
    }
    if name.contains("veth") && !name.contains("vnet") {
        return false;
    }
    if name.contains("br-") && !name.contains("virbr") {
        return false;
    }
    true
}

/// Private and link-local ranges, used to gate the routing-query strategy
/// to genuinely outbound destinations.
fn is_local_address(ip: &str) -> bool {
    if ip == "127.0.0.1" || ip == "0.0.0.0" {
        return true;
    }
    let Ok(parsed) = Ipv4Addr::from_str(ip) else {
        return false;
    };
    parsed.is_loopback() || parsed.is_private() || parsed.is_link_local()
}

/// Parse `ip -4 addr show` output into an IP→interface map.
///
/// Interface header lines look like `2: eth0: <BROADCAST,MULTICAST,UP>`;
/// address lines look like `inet 192.168.1.100/24 brd … scope global eth0`.
/// Secondary labeled addresses (`… scope global secondary eth0:label`) map
/// to the base interface name for label consistency.
fn parse_address_listing(output: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        let line = line.trim();

        if line.contains(": <") && !line.starts_with("inet") {
            if let Some(name) = line.split(':').nth(1) {
                current = Some(name.trim().to_owned());
            }
        }

        if line.starts_with("inet ")
            && let Some(iface) = current.as_deref()
        {
            let Some(cidr) = line.split_whitespace().nth(1) else {
                continue;
            };
            let Some((ip, _prefix)) = cidr.split_once('/') else {
                continue;
            };
            if ip == "127.0.0.1" || iface == "lo" {
                continue;
            }
            map.insert(ip.to_owned(), iface.to_owned());
        }
    }

    map
}

/// Extract the device of the default route from `ip route show default`.
fn parse_default_route(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("default via"))
        .find_map(parse_route_device_line)
}

/// Extract the `dev` token from any routing-table line, e.g.
/// `8.8.8.8 via 192.168.1.1 dev eth0 src 192.168.1.100 uid 0`.
fn parse_route_device(output: &str) -> Option<String> {
    output.lines().find_map(parse_route_device_line)
}

fn parse_route_device_line(line: &str) -> Option<String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields
        .iter()
        .position(|field| *field == "dev")
        .and_then(|pos| fields.get(pos + 1))
        .map(|device| (*device).to_owned())
}

/// Log bonding slaves for a retained bonding interface, best effort.
fn log_bonding_slaves(name: &str) {
    let path = Path::new(BONDING_DIR).join(name);
    let Ok(content) = fs::read_to_string(&path) else {
        return;
    };
    let slaves: Vec<&str> = content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Slave Interface:"))
        .map(str::trim)
        .collect();
    if !slaves.is_empty() {
        debug!(
            event.name = "iface.bonding_active",
            network.interface.name = %name,
            slaves = ?slaves,
            "bonding interface is active"
        );
    }
}
