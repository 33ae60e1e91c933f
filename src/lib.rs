//! Host-local socket telemetry collector.
//!
//! Decodes the kernel's per-protocol connection tables (`/proc/net/tcp`,
//! `/proc/net/udp`) into typed connection records, resolves each record's
//! local address to the network interface that owns it, and exposes the
//! result as labeled Prometheus metrics for periodic scraping.

pub mod collector;
pub mod conn;
pub mod diag;
pub mod health;
pub mod iface;
pub mod metrics;
pub mod procname;
pub mod runtime;
