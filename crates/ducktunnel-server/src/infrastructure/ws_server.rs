//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Optionally terminating TLS on each accepted stream.
//! 3. Running the upgrade handshake, refusing requests for the wrong path or
//!    without a room before any room state is touched.
//! 4. Joining the client's room through a core [`Session`] and running two
//!    halves per client on one task:
//!    - **Reader**: inbound frames → [`Session::run`] → room broadcast.
//!    - **Writer**: the client's outbound queue → WebSocket sink.
//! 5. Gracefully shutting down when the `running` flag is cleared.
//!
//! # Shutdown
//!
//! Connection tasks live in a [`JoinSet`].  When the accept loop exits the
//! set is shut down, which aborts every task; dropping a task's [`Session`]
//! removes its client from the room.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, error, info, warn};

use ducktunnel_core::{Connection, Registry, RoomId, Session};

use crate::application::room_from_request;
use crate::domain::ServerConfig;
use crate::infrastructure::ws_connection::{inbound_messages, write_outbound, WsConnection};

#[cfg(feature = "tls")]
use crate::infrastructure::tls::TlsAcceptor;

/// How long `accept()` may block before the `running` flag is re-checked.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or if TLS was requested
/// and the certificate cannot be loaded.
pub async fn run_server(
    config: ServerConfig,
    registry: Arc<Registry>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;

    info!(
        "ducktunnel relay listening on {} (path: {}, tls: {})",
        config.bind_addr,
        config.ws_path,
        config.tls.is_some()
    );

    serve(listener, config, registry, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split from [`run_server`] so callers can bind port 0 and learn the
/// address before serving.
///
/// # Errors
///
/// Returns an error if TLS was requested and cannot be set up.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<Registry>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let acceptor = Acceptor::from_config(&config)?;
    let config = Arc::new(config);
    let mut connections = JoinSet::new();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Reap finished connection tasks so the set does not grow unbounded.
        while connections.try_join_next().is_some() {}

        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let acceptor = acceptor.clone();
                let config = Arc::clone(&config);
                let registry = Arc::clone(&registry);
                connections.spawn(async move {
                    handle_connection(stream, peer_addr, acceptor, config, registry).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout; loop back to check the `running` flag.
            }
        }
    }

    if !connections.is_empty() {
        info!("closing {} open connection(s)", connections.len());
    }
    connections.shutdown().await;
    Ok(())
}

// ── Transport selection ───────────────────────────────────────────────────────

#[derive(Clone)]
enum Acceptor {
    Plain,
    #[cfg(feature = "tls")]
    Tls(TlsAcceptor),
}

impl Acceptor {
    fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        match &config.tls {
            None => Ok(Self::Plain),
            #[cfg(feature = "tls")]
            Some(tls) => {
                let acceptor =
                    TlsAcceptor::from_config(tls).context("failed to set up TLS")?;
                Ok(Self::Tls(acceptor))
            }
            #[cfg(not(feature = "tls"))]
            Some(_) => anyhow::bail!(
                "TLS was requested but ducktunnel-server was built without the `tls` feature"
            ),
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Entry point of each connection task.  Logs the outcome of
/// [`run_connection`].
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: Acceptor,
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
) {
    let result = match acceptor {
        Acceptor::Plain => run_connection(stream, peer_addr, &config, &registry).await,
        #[cfg(feature = "tls")]
        Acceptor::Tls(tls) => match timeout(config.handshake_timeout, tls.accept(stream)).await {
            Ok(Ok(stream)) => run_connection(stream, peer_addr, &config, &registry).await,
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(anyhow::anyhow!(
                "TLS handshake timed out after {:?}",
                config.handshake_timeout
            )),
        },
    };

    match result {
        Ok(()) => debug!("connection {peer_addr} closed"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one client over any byte stream.
///
/// 1. Completes the upgrade handshake within `config.handshake_timeout`,
///    capturing the requested room.
/// 2. Joins the room through [`Session::connect`].
/// 3. Runs the reader and writer halves until the client leaves or is
///    closed by a failed delivery.
///
/// A refused handshake is not an error: tungstenite has already written the
/// `404` or `400` response.
async fn run_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    config: &ServerConfig,
    registry: &Registry,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // ── Step 1: handshake ──────────────────────────────────────────────────────
    let mut requested_room: Option<RoomId> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match room_from_request(request.uri(), &config.ws_path) {
            Ok(room) => {
                requested_room = Some(room);
                Ok(response)
            }
            Err(rejection) => Err(rejection.into_response()),
        }
    };

    let handshake = timeout(config.handshake_timeout, accept_hdr_async(stream, callback)).await;
    let Ok(handshake) = handshake else {
        anyhow::bail!(
            "WebSocket handshake with {peer_addr} timed out after {:?}",
            config.handshake_timeout
        );
    };
    let ws_stream = match handshake {
        Ok(ws_stream) => ws_stream,
        Err(WsError::Http(response)) => {
            debug!(
                "refused upgrade from {peer_addr}: {}",
                response.status()
            );
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("WebSocket handshake failed with {peer_addr}"))
        }
    };

    // ── Step 2: join the room ─────────────────────────────────────────────────
    let (conn, outbound_rx, closed_rx) = WsConnection::new(config.outbound_buffer);
    let conn = Arc::new(conn);
    let id = conn.id();
    let session = Session::connect(
        registry,
        requested_room.as_ref().map(RoomId::as_str),
        Arc::clone(&conn) as Arc<dyn Connection>,
    )?;

    // ── Step 3: reader and writer ─────────────────────────────────────────────
    let (ws_tx, ws_rx) = ws_stream.split();
    let writer = write_outbound(ws_tx, outbound_rx, closed_rx.clone(), id);
    let reader = async {
        let outcome = session.run(inbound_messages(ws_rx, closed_rx)).await;
        // Stops the writer, which sends our Close frame.
        conn.close();
        outcome
    };

    let ((), outcome) = tokio::join!(writer, reader);

    match outcome {
        Ok(summary) => debug!(
            "client {id} ({peer_addr}) left room {} after relaying {} message(s)",
            summary.room_id, summary.relayed
        ),
        // Already logged by the session.
        Err(e) => debug!("client {id} ({peer_addr}) ended with error: {e}"),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_acceptor_without_tls_config() {
        let acceptor = Acceptor::from_config(&ServerConfig::default()).unwrap();
        assert!(matches!(acceptor, Acceptor::Plain));
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn test_tls_request_fails_without_tls_feature() {
        use crate::domain::TlsConfig;

        let config = ServerConfig {
            tls: Some(TlsConfig {
                cert_path: "localhost.pem".into(),
                key_path: "localhost-key.pem".into(),
            }),
            ..ServerConfig::default()
        };

        let err = Acceptor::from_config(&config).err().expect("must fail");

        assert!(err.to_string().contains("`tls` feature"));
    }

    #[tokio::test]
    async fn test_serve_returns_once_running_is_cleared() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let running = Arc::new(AtomicBool::new(false));

        // Act
        let result = timeout(
            Duration::from_secs(2),
            serve(
                listener,
                ServerConfig::default(),
                Arc::new(Registry::new()),
                running,
            ),
        )
        .await;

        // Assert
        assert!(matches!(result, Ok(Ok(()))));
    }
}
