//! Infrastructure layer for ducktunnel-server.
//!
//! Everything that owns an OS resource:
//!
//! - [`ws_server`] – TCP listener, upgrade handshake, per-connection tasks.
//! - [`ws_connection`] – the core `Connection` handle and its socket halves.
//! - [`config_file`] – optional TOML configuration.
//! - `tls` – native-tls acceptor, compiled with the `tls` feature.

pub mod config_file;
#[cfg(feature = "tls")]
pub mod tls;
pub mod ws_connection;
pub mod ws_server;

pub use ws_server::{run_server, serve};
