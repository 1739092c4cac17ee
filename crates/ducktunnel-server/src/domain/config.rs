//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  It is
//! built once at startup and then shared read-only by every connection task.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listener port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default upgrade path.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default limit for a client to complete the TLS and WebSocket handshakes.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default certificate file, relative to the working directory.
pub const DEFAULT_CERT_FILE: &str = "localhost.pem";

/// Default private key file, relative to the working directory.
pub const DEFAULT_KEY_FILE: &str = "localhost-key.pem";

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use ducktunnel_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8000);
/// assert_eq!(cfg.ws_path, "/ws");
/// assert!(cfg.tls.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port the listener binds to.
    pub bind_addr: SocketAddr,

    /// Request path that may be upgraded to a WebSocket.  Any other path is
    /// answered with `404 Not Found`.
    pub ws_path: String,

    /// Capacity of each connection's outbound queue.
    ///
    /// A peer that falls this many messages behind is considered stalled: the
    /// next delivery to it fails and it is removed from its room.
    pub outbound_buffer: usize,

    /// How long an accepted connection may take to finish its handshake
    /// (TLS, then the WebSocket upgrade) before it is dropped.
    pub handshake_timeout: Duration,

    /// TLS termination settings.  `None` serves plain `ws://`.
    pub tls: Option<TlsConfig>,
}

/// Certificate and key used for TLS termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain.
    pub cert_path: PathBuf,
    /// PEM-encoded PKCS#8 private key.
    pub key_path: PathBuf,
}

impl Default for ServerConfig {
    /// | Field             | Default        |
    /// |-------------------|----------------|
    /// | bind_addr         | `0.0.0.0:8000` |
    /// | ws_path           | `/ws`          |
    /// | outbound_buffer   | 64             |
    /// | handshake_timeout | 10 s           |
    /// | tls               | disabled       |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            ws_path: DEFAULT_WS_PATH.to_string(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            tls: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
