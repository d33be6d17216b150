//! End-to-end tests over real network connections, plus shared helpers.
//!
//! The scenarios here run two real nodes on loopback: each with its own
//! worker pool, data source and TCP listener, wired together through
//! [`crate::network::TcpTransport`] and hand-fed cluster views.

#[cfg(test)]
mod utils;
