//! Unix domain socket transport for CSI messages.
//!
//! This module provides [`CsiClient`] and [`CsiServer`] that exchange
//! JSON-encoded [`CsiMessage`](crate::message::CsiMessage) values.  Each
//! connection carries one request and one response: the client half-closes
//! after writing, the server reads to EOF and replies.

pub mod client;
pub mod server;

pub use client::CsiClient;
pub use server::CsiServer;

/// Upper bound on a single encoded message.
pub(crate) const MAX_MESSAGE_BYTES: u64 = 16 * 1024 * 1024;
