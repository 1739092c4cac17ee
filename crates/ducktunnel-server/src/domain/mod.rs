//! Domain layer for ducktunnel-server.
//!
//! Plain configuration types.  Populating them from CLI arguments, environment
//! variables or a config file is done elsewhere (`main.rs` and
//! `infrastructure::config_file`).

pub mod config;

pub use config::{ServerConfig, TlsConfig};
