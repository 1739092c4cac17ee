//! ducktunnel relay server entry point.
//!
//! Accepts WebSocket connections at `/ws?room=<id>` and relays every JSON
//! object a client sends to the other clients in the same room.  Rooms are
//! created on first join and kept for the lifetime of the process.
//!
//! # Usage
//!
//! ```text
//! ducktunnel-server [OPTIONS]
//!
//! Options:
//!   --config <FILE>             TOML config file
//!   --port <PORT>               Listener port [default: 8000]
//!   --bind <IP>                 Listener address [default: 0.0.0.0]
//!   --path <PATH>               WebSocket endpoint [default: /ws]
//!   --outbound-buffer <N>       Per-client outbound queue [default: 64]
//!   --handshake-timeout <SECS>  Handshake time limit [default: 10]
//!   --tls[=<BOOL>]              Serve wss:// (needs the `tls` feature)
//!   --cert <FILE>               PEM certificate [default: localhost.pem]
//!   --key <FILE>                PEM PKCS#8 key [default: localhost-key.pem]
//! ```
//!
//! # Environment variable overrides
//!
//! Every option has an environment fallback.  CLI args take precedence over
//! the environment, which takes precedence over the config file.
//!
//! | Variable                       | Option                |
//! |--------------------------------|-----------------------|
//! | `DUCKTUNNEL_CONFIG`            | `--config`            |
//! | `DUCKTUNNEL_PORT`              | `--port`              |
//! | `DUCKTUNNEL_BIND`              | `--bind`              |
//! | `DUCKTUNNEL_WS_PATH`           | `--path`              |
//! | `DUCKTUNNEL_OUTBOUND_BUFFER`   | `--outbound-buffer`   |
//! | `DUCKTUNNEL_HANDSHAKE_TIMEOUT` | `--handshake-timeout` |
//! | `DUCKTUNNEL_TLS`               | `--tls`               |
//! | `DUCKTUNNEL_CERT`              | `--cert`              |
//! | `DUCKTUNNEL_KEY`               | `--key`               |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ducktunnel_core::Registry;
use ducktunnel_server::domain::config::{DEFAULT_CERT_FILE, DEFAULT_KEY_FILE};
use ducktunnel_server::domain::{ServerConfig, TlsConfig};
use ducktunnel_server::infrastructure::config_file::{load_config_file, FileConfig};
use ducktunnel_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ducktunnel WebSocket room relay.
///
/// Every field is optional so that unset values can fall through to the
/// config file and then to the built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "ducktunnel-server",
    about = "WebSocket room relay: fans out JSON messages to every other client in a room",
    version
)]
struct Cli {
    /// TOML config file supplying defaults for the options below.
    #[arg(long, env = "DUCKTUNNEL_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long, env = "DUCKTUNNEL_PORT")]
    port: Option<u16>,

    /// IP address to bind to.
    ///
    /// Use `0.0.0.0` to accept connections on every interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, env = "DUCKTUNNEL_BIND")]
    bind: Option<String>,

    /// Request path that accepts WebSocket upgrades.
    #[arg(long, env = "DUCKTUNNEL_WS_PATH")]
    path: Option<String>,

    /// Capacity of each client's outbound queue.
    ///
    /// A client this many messages behind is treated as dead and removed
    /// from its room.
    #[arg(long, env = "DUCKTUNNEL_OUTBOUND_BUFFER")]
    outbound_buffer: Option<usize>,

    /// Seconds a new connection may take to finish the TLS and WebSocket
    /// handshakes before it is dropped.
    #[arg(long, env = "DUCKTUNNEL_HANDSHAKE_TIMEOUT")]
    handshake_timeout: Option<u64>,

    /// Terminate TLS and serve `wss://`.
    #[arg(
        long,
        env = "DUCKTUNNEL_TLS",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    tls: Option<bool>,

    /// PEM certificate chain used with `--tls`.
    #[arg(long, env = "DUCKTUNNEL_CERT")]
    cert: Option<PathBuf>,

    /// PEM PKCS#8 private key used with `--tls`.
    #[arg(long, env = "DUCKTUNNEL_KEY")]
    key: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file named by `--config`, if any, and merges it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged values are invalid (see [`Cli::merge`]).
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let file = match &self.config {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    /// Merges CLI/env values over `file` over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not an IP address, the path
    /// does not start with `/`, the outbound buffer or handshake timeout is
    /// zero, or the working directory needed to resolve relative TLS paths
    /// is unavailable.
    fn merge(self, file: FileConfig) -> anyhow::Result<ServerConfig> {
        let defaults = ServerConfig::default();

        let ip = match self.bind.or(file.server.bind) {
            Some(bind) => bind
                .parse::<IpAddr>()
                .with_context(|| format!("invalid bind address: '{bind}'"))?,
            None => defaults.bind_addr.ip(),
        };
        let port = self
            .port
            .or(file.server.port)
            .unwrap_or(defaults.bind_addr.port());

        let ws_path = self.path.or(file.server.path).unwrap_or(defaults.ws_path);
        if !ws_path.starts_with('/') {
            anyhow::bail!("WebSocket path must start with '/': '{ws_path}'");
        }

        let outbound_buffer = self
            .outbound_buffer
            .or(file.server.outbound_buffer)
            .unwrap_or(defaults.outbound_buffer);
        if outbound_buffer == 0 {
            anyhow::bail!("outbound buffer must be at least 1");
        }

        let handshake_timeout = match self
            .handshake_timeout
            .or(file.server.handshake_timeout_secs)
        {
            Some(0) => anyhow::bail!("handshake timeout must be at least 1 second"),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.handshake_timeout,
        };

        let tls = if self.tls.or(file.tls.enabled).unwrap_or(false) {
            let cert = self
                .cert
                .or(file.tls.cert)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_FILE));
            let key = self
                .key
                .or(file.tls.key)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_FILE));
            Some(TlsConfig {
                cert_path: absolute(cert)?,
                key_path: absolute(key)?,
            })
        } else {
            None
        };

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, port),
            ws_path,
            outbound_buffer,
            handshake_timeout,
            tls,
        })
    }
}

fn absolute(path: PathBuf) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("failed to resolve the working directory")?;
    Ok(cwd.join(path))
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Initialises `tracing_subscriber`; the level comes from `RUST_LOG`
///    (default `info`).
/// 2. Parses CLI arguments and builds the [`ServerConfig`].
/// 3. Spawns a Ctrl+C handler that clears the shared `running` flag.
/// 4. Runs the accept loop until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let config = Cli::parse().into_server_config()?;

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ───────────────────────────────────────────────────────
    let registry = Arc::new(Registry::new());
    run_server(config, Arc::clone(&registry), running).await?;

    info!(
        "ducktunnel relay stopped ({} room(s) created)",
        registry.room_count()
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
