//! Decoding of the kernel's line-oriented connection tables.
//!
//! The kernel maintains one table per protocol with a fixed column layout:
//! local address, remote address, state code, queue counters and so on at
//! fixed field indices. This module turns those rows into
//! [`ConnectionRecord`]s, skipping what cannot be decoded rather than
//! failing the read.

pub mod addr;
pub mod record;
pub mod state;
pub mod table;

pub use record::{ConnectionRecord, Direction, Protocol};
pub use state::SocketState;
