//! Connection sessions: the per-connection control loop.
//!
//! ```text
//! Connecting ──connect──▶ Joined ──run──▶ Looping ◀──▶ Broadcasting
//!     │                                      │
//!     └── no room id ──▶ (rejected)          └── close / receive error / drop ──▶ Closed
//! ```
//!
//! A [`Session`] is created by [`Session::connect`], which resolves the room
//! through the [`Registry`] and joins it.  [`Session::run`] then relays every
//! message from the inbound stream to the rest of the room until the stream
//! ends or yields an error.
//!
//! # Leaving exactly once
//!
//! [`Session::close`] leaves the room and moves to [`SessionState::Closed`];
//! calling it again does nothing.  `run` calls it on every exit path, and
//! `Drop` calls it for sessions that are cancelled mid-loop (their task was
//! aborted during shutdown, for example).  The room therefore sees exactly
//! one `leave` per session.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::connection::{Connection, ConnectionId};
use crate::domain::{Message, MessageError, RoomId};
use crate::room::registry::Registry;
use crate::room::Room;

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The connect request did not name a room.
    #[error("room id is required")]
    MissingRoomId,

    /// An inbound frame was not a JSON object.
    #[error("malformed message: {0}")]
    Decode(#[from] MessageError),

    /// The transport failed while reading the next frame.
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Lifecycle position of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The request has not been resolved to a room yet.
    Connecting,
    /// Member of the room, receive loop not started.
    Joined,
    /// Waiting for the next inbound message.
    Looping,
    /// Fanning one message out to the room.
    Broadcasting,
    /// Left the room.  Terminal.
    Closed,
}

/// What a session did before it ended cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub room_id: RoomId,
    /// Number of inbound messages broadcast to the room.
    pub relayed: u64,
}

/// One client's membership in one room.
pub struct Session {
    room: Arc<Room>,
    connection: Arc<dyn Connection>,
    state: SessionState,
    relayed: u64,
}

impl Session {
    /// Resolves `room` and joins it with `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingRoomId`] when `room` is absent or empty.
    /// No registry or room state is touched in that case.
    pub fn connect(
        registry: &Registry,
        room: Option<&str>,
        connection: Arc<dyn Connection>,
    ) -> Result<Self, SessionError> {
        let room_id = room
            .and_then(RoomId::new)
            .ok_or(SessionError::MissingRoomId)?;

        let room = registry.get_or_create(&room_id);
        let members = room.join(Arc::clone(&connection));

        info!(
            "client {} connected to room: {room_id}. Total clients: {members}",
            connection.id()
        );

        let mut session = Self {
            room,
            connection,
            state: SessionState::Connecting,
            relayed: 0,
        };
        session.transition(SessionState::Joined);
        Ok(session)
    }

    /// Relays inbound messages until the stream ends or fails.
    ///
    /// A stream that ends (`None`) is a clean close and yields the session
    /// summary.  An `Err` item ends the session with that error.  The session
    /// has left its room by the time this returns, whichever way it ends.
    pub async fn run<S>(mut self, mut incoming: S) -> Result<SessionSummary, SessionError>
    where
        S: Stream<Item = Result<Message, SessionError>> + Unpin,
    {
        self.transition(SessionState::Looping);

        let outcome = loop {
            match incoming.next().await {
                Some(Ok(message)) => {
                    self.relay(message);
                }
                Some(Err(e)) => {
                    warn!("client {}: {e}", self.connection.id());
                    break Err(e);
                }
                None => {
                    debug!("client {}: inbound stream ended", self.connection.id());
                    break Ok(());
                }
            }
        };

        self.close();
        outcome.map(|()| self.summary())
    }

    /// Broadcasts one message to the rest of the room and closes every peer
    /// whose delivery failed.  Returns the number of peers pruned.
    ///
    /// Does nothing once the session is closed.
    pub fn relay(&mut self, message: Message) -> usize {
        if self.state == SessionState::Closed {
            return 0;
        }

        self.transition(SessionState::Broadcasting);
        let failed = self.room.broadcast(&self.connection.id(), &message);
        for peer in &failed {
            debug!(
                "client {}: closing unreachable peer {} in room {}",
                self.connection.id(),
                peer.id(),
                self.room.id()
            );
            peer.close();
        }
        self.relayed += 1;
        self.transition(SessionState::Looping);

        failed.len()
    }

    /// Leaves the room.  Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        let remaining = self.room.leave(&self.connection.id());
        self.transition(SessionState::Closed);

        info!(
            "client {} disconnected from room: {}. Total clients: {remaining}",
            self.connection.id(),
            self.room.id()
        );
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            room_id: self.room.id().clone(),
            relayed: self.relayed,
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(
            "client {}: {:?} -> {next:?}",
            self.connection.id(),
            self.state
        );
        self.state = next;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockConnection;
    use crate::connection::DeliveryError;
    use futures_util::stream;

    mockall::mock! {
        Peer {}
        impl Connection for Peer {
            fn id(&self) -> ConnectionId;
            fn send(&self, message: &Message) -> Result<(), DeliveryError>;
            fn close(&self);
        }
    }

    fn msg(raw: &str) -> Message {
        Message::from_text(raw).unwrap()
    }

    fn mock_member() -> (Arc<MockConnection>, Arc<dyn Connection>) {
        let conn = Arc::new(MockConnection::new());
        let handle: Arc<dyn Connection> = conn.clone();
        (conn, handle)
    }

    #[test]
    fn test_connect_without_room_is_rejected_before_touching_registry() {
        // Arrange
        let registry = Registry::new();
        let (_conn, handle) = mock_member();

        // Act
        let result = Session::connect(&registry, None, handle);

        // Assert
        assert!(matches!(result, Err(SessionError::MissingRoomId)));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_connect_with_empty_room_is_rejected() {
        let registry = Registry::new();
        let (_conn, handle) = mock_member();

        let result = Session::connect(&registry, Some(""), handle);

        assert!(matches!(result, Err(SessionError::MissingRoomId)));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_connect_joins_room() {
        let registry = Registry::new();
        let (conn, handle) = mock_member();

        let session = Session::connect(&registry, Some("r1"), handle).unwrap();

        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(session.room().id().as_str(), "r1");
        assert!(session.room().contains(&conn.id()));
    }

    #[test]
    fn test_close_is_idempotent() {
        // Arrange: two members so the second can observe the count.
        let registry = Registry::new();
        let (_a, a) = mock_member();
        let (_b, b) = mock_member();
        let mut session = Session::connect(&registry, Some("r1"), a).unwrap();
        let _other = Session::connect(&registry, Some("r1"), b).unwrap();

        // Act
        session.close();
        session.close();

        // Assert
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.room().member_count(), 1);
    }

    #[test]
    fn test_dropping_a_session_leaves_the_room() {
        let registry = Registry::new();
        let (conn, handle) = mock_member();
        let session = Session::connect(&registry, Some("r1"), handle).unwrap();
        let room = Arc::clone(session.room());

        drop(session);

        assert!(!room.contains(&conn.id()));
    }

    #[test]
    fn test_relay_after_close_is_noop() {
        let registry = Registry::new();
        let (_a, a) = mock_member();
        let (b_mock, b) = mock_member();
        let mut session = Session::connect(&registry, Some("r1"), a).unwrap();
        let _other = Session::connect(&registry, Some("r1"), b).unwrap();

        session.close();
        session.relay(msg(r#"{"late":true}"#));

        assert!(b_mock.received().is_empty());
    }

    #[test]
    fn test_relay_closes_each_failed_peer_exactly_once() {
        // Arrange: a peer whose every delivery fails; `close` must be called
        // on it exactly once, by the session that saw the failure.
        let registry = Registry::new();
        let peer_id = ConnectionId::new();
        let mut peer = MockPeer::new();
        peer.expect_id().return_const(peer_id);
        peer.expect_send().returning(|_| Err(DeliveryError::Backpressure));
        peer.expect_close().times(1).return_const(());
        let peer: Arc<dyn Connection> = Arc::new(peer);

        let room = registry.get_or_create(&RoomId::new("r1").unwrap());
        room.join(peer);
        let (_s, sender) = mock_member();
        let mut session = Session::connect(&registry, Some("r1"), sender).unwrap();

        // Act
        let pruned_first = session.relay(msg(r#"{"n":1}"#));
        let pruned_second = session.relay(msg(r#"{"n":2}"#));

        // Assert
        assert_eq!(pruned_first, 1);
        assert_eq!(pruned_second, 0, "pruned peer must not be retried");
        assert!(!room.contains(&peer_id));
    }

    #[tokio::test]
    async fn test_run_relays_until_stream_ends() {
        // Arrange
        let registry = Registry::new();
        let (_a, a) = mock_member();
        let (b_mock, b) = mock_member();
        let session = Session::connect(&registry, Some("r1"), a).unwrap();
        let _b_session = Session::connect(&registry, Some("r1"), b).unwrap();
        let incoming = stream::iter(vec![Ok(msg(r#"{"n":1}"#)), Ok(msg(r#"{"n":2}"#))]);

        // Act
        let summary = session.run(incoming).await.expect("clean close");

        // Assert
        assert_eq!(summary.relayed, 2);
        assert_eq!(summary.room_id.as_str(), "r1");
        assert_eq!(b_mock.received_texts(), vec![r#"{"n":1}"#, r#"{"n":2}"#]);
        let room = registry.get("r1").unwrap();
        assert_eq!(room.member_count(), 1, "finished session must have left");
    }

    #[tokio::test]
    async fn test_run_stops_at_first_receive_error() {
        // Arrange: the decode error in the middle must end the session, so
        // the message after it is never relayed.
        let registry = Registry::new();
        let (a_mock, a) = mock_member();
        let (b_mock, b) = mock_member();
        let session = Session::connect(&registry, Some("r1"), a).unwrap();
        let _b_session = Session::connect(&registry, Some("r1"), b).unwrap();
        let incoming = stream::iter(vec![
            Ok(msg(r#"{"n":1}"#)),
            Message::from_text("[]").map_err(SessionError::from),
            Ok(msg(r#"{"n":3}"#)),
        ]);

        // Act
        let result = session.run(incoming).await;

        // Assert
        assert!(matches!(
            result,
            Err(SessionError::Decode(MessageError::NotAnObject))
        ));
        assert_eq!(b_mock.received_texts(), vec![r#"{"n":1}"#]);
        let room = registry.get("r1").unwrap();
        assert!(!room.contains(&a_mock.id()));
        assert!(room.contains(&b_mock.id()), "other sessions are unaffected");
    }
}
