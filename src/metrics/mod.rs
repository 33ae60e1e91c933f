//! Prometheus metrics collection and HTTP server.
//!
//! The `/metrics` endpoint serves two families of data: the per-connection
//! `network_connections_info` gauge produced by a fresh collection pass on
//! every scrape, and sockmon's own operational metrics (table reads,
//! resolver strategy outcomes, pass duration).

pub mod connections;
pub mod error;
pub mod opts;
pub mod registry;
pub mod server;

pub use error::MetricsError;
