//! Optional TOML configuration file.
//!
//! Every setting can also come from the command line or the environment; the
//! file only supplies values the CLI leaves unset.  All keys are optional:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8000
//! path = "/ws"
//! outbound_buffer = 64
//! handshake_timeout_secs = 10
//!
//! [tls]
//! enabled = true
//! cert = "/etc/ducktunnel/localhost.pem"
//! key = "/etc/ducktunnel/localhost-key.pem"
//! ```
//!
//! Unknown keys are rejected so that a typo does not silently fall back to a
//! default.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for config file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level file schema.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub tls: TlsSection,
}

/// `[server]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub outbound_buffer: Option<usize>,
    pub handshake_timeout_secs: Option<u64>,
}

/// `[tls]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TlsSection {
    pub enabled: Option<bool>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

/// Parses config file contents.
pub fn parse_config(text: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Reads and parses the config file at `path`.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
