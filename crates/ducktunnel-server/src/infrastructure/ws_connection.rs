//! The WebSocket side of a core [`Connection`].
//!
//! Each accepted client gets:
//!
//! - a [`WsConnection`] handle, shared with the core (the room keeps an
//!   `Arc` of it while the client is a member);
//! - a bounded outbound queue, drained by [`write_outbound`] into the
//!   WebSocket sink on its own task;
//! - a `watch` flag that [`Connection::close`] raises to stop both the
//!   writer and the inbound stream built by [`inbound_messages`].
//!
//! The handle never touches the socket, so [`Connection::send`] is a
//! `try_send` that cannot block: a full queue means the peer is stalled and
//! is reported as [`DeliveryError::Backpressure`].
//!
//! The queue holds shared [`Message`]s, so enqueueing under the room lock
//! never copies the payload.  The writer copies the text once per recipient
//! when it builds the outgoing frame, because a tungstenite Text frame owns
//! its `String`.  That copy happens on the recipient's own task, outside any
//! room lock.

use futures_util::{stream, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::debug;

use ducktunnel_core::{Connection, ConnectionId, DeliveryError, Message, SessionError};

use crate::application::{classify_frame, InboundFrame};

/// Core-facing handle for one WebSocket client.
pub struct WsConnection {
    id: ConnectionId,
    outbound: mpsc::Sender<Message>,
    closed: watch::Sender<bool>,
}

impl WsConnection {
    /// Creates a handle with an outbound queue of `buffer` messages.
    ///
    /// Returns the handle together with the queue's receiver (for the writer
    /// task) and a receiver of the close flag.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is zero; the config layer rejects that value.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Message>, watch::Receiver<bool>) {
        let (outbound, outbound_rx) = mpsc::channel(buffer);
        let (closed, closed_rx) = watch::channel(false);
        let conn = Self {
            id: ConnectionId::new(),
            outbound,
            closed,
        };
        (conn, outbound_rx, closed_rx)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.outbound
            .try_send(message.clone())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    fn close(&self) {
        // `send_replace` succeeds even when every receiver is gone.
        self.closed.send_replace(true);
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Drains the outbound queue into the WebSocket sink.
///
/// Runs until the close flag is raised, the queue's senders are all dropped,
/// or a write fails; then closes the sink, which sends a Close frame.
pub async fn write_outbound<W>(
    mut sink: W,
    mut outbound: mpsc::Receiver<Message>,
    mut closed: watch::Receiver<bool>,
    id: ConnectionId,
) where
    W: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            biased;

            // The `watch::Ref` from `wait_for` must not outlive this arm.
            _ = async { let _ = closed.wait_for(|closed| *closed).await; } => break,

            next = outbound.recv() => match next {
                Some(message) => {
                    if let Err(e) = sink.send(WsMessage::Text(message.as_text().to_string())).await {
                        debug!("client {id}: WebSocket send failed: {e}");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    if let Err(e) = sink.close().await {
        debug!("client {id}: WebSocket close failed: {e}");
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Adapts the WebSocket read half into the message stream a core session
/// consumes.
///
/// Control frames are skipped.  The stream ends at a Close frame, at the end
/// of the socket, or as soon as the close flag is raised.
pub fn inbound_messages<R>(
    frames: R,
    mut closed: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Message, SessionError>> + Send + Unpin
where
    R: Stream<Item = Result<WsMessage, WsError>> + Send + Unpin + 'static,
{
    let until_closed = Box::pin(async move {
        // An error means the handle was dropped, which also ends the stream.
        let _ = closed.wait_for(|closed| *closed).await;
    });
    let frames = frames.take_until(until_closed);

    Box::pin(stream::unfold(frames, |mut frames| async move {
        loop {
            let frame = match frames.next().await {
                Some(frame) => frame,
                None => return None,
            };
            match classify_frame(frame) {
                InboundFrame::Message(message) => return Some((Ok(message), frames)),
                InboundFrame::Error(e) => return Some((Err(e), frames)),
                InboundFrame::Skip => continue,
                InboundFrame::Close => return None,
            }
        }
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
