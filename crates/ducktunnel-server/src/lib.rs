//! ducktunnel-server library crate.
//!
//! The WebSocket transport in front of `ducktunnel-core`: it accepts
//! connections, performs the upgrade handshake, and runs one core
//! [`Session`](ducktunnel_core::Session) per client.
//!
//! # Architecture
//!
//! ```text
//! Browser (JSON over WebSocket, /ws?room=<id>)
//!         ↕
//! [ducktunnel-server]
//!   ├── domain/           ServerConfig, TlsConfig
//!   ├── application/      Handshake checks, frame classification
//!   └── infrastructure/
//!         ├── ws_server/      Accept loop, per-connection tasks
//!         ├── ws_connection/  Connection handle, outbound writer
//!         ├── config_file/    TOML config loading
//!         └── tls/            native-tls acceptor (feature `tls`)
//!         ↕
//! [ducktunnel-core]  Registry → Room → Session
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `ducktunnel-core` only.
//! - `infrastructure` owns sockets, tasks and files.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: handshake and frame rules.
pub mod application;

/// Infrastructure layer: listener, WebSocket sessions, config file, TLS.
pub mod infrastructure;
