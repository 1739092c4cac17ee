//! Handshake and frame rules for the relay's WebSocket protocol.
//!
//! # Handshake
//!
//! Clients connect to `ws_path` (default `/ws`) and name their room in the
//! query string:
//!
//! ```text
//! GET /ws?room=quick-brown-duck HTTP/1.1
//! Upgrade: websocket
//! ```
//!
//! Requests for any other path get `404`; requests without a non-empty
//! `room` parameter get `400 Room ID is required`.  Both are rejected before
//! the upgrade completes, so no room state is touched.
//!
//! # Frames
//!
//! Text and Binary frames each carry one JSON object.  Ping and Pong are
//! answered by tungstenite itself.  A Close frame, or the peer going away,
//! ends the stream cleanly; any other read error ends it with an error.

use ducktunnel_core::{Message, RoomId, SessionError};
use tokio_tungstenite::tungstenite::handshake::server::ErrorResponse;
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

/// Name of the query parameter that carries the room id.
pub const ROOM_QUERY_PARAM: &str = "room";

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Why an upgrade request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRejection {
    /// The request path is not the WebSocket endpoint.
    NotFound,
    /// The `room` parameter is absent or empty.
    MissingRoomId,
}

impl HandshakeRejection {
    pub fn status(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MissingRoomId => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Self::NotFound => "404 page not found",
            Self::MissingRoomId => "Room ID is required",
        }
    }

    /// Builds the HTTP response tungstenite sends instead of upgrading.
    pub fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.body().to_string()));
        *response.status_mut() = self.status();
        response
    }
}

/// Checks the upgrade request URI and extracts the requested room.
///
/// The query string is decoded with `application/x-www-form-urlencoded`
/// rules; when `room` appears more than once the first value wins.
pub fn room_from_request(uri: &Uri, ws_path: &str) -> Result<RoomId, HandshakeRejection> {
    if uri.path() != ws_path {
        return Err(HandshakeRejection::NotFound);
    }

    let query = uri.query().unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == ROOM_QUERY_PARAM)
        .and_then(|(_, value)| RoomId::new(value.into_owned()))
        .ok_or(HandshakeRejection::MissingRoomId)
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// What the session loop should do with one inbound frame.
#[derive(Debug)]
pub enum InboundFrame {
    /// Relay this message to the room.
    Message(Message),
    /// End the session with an error.
    Error(SessionError),
    /// Control frame; nothing to relay.
    Skip,
    /// The peer closed the connection.
    Close,
}

/// Maps one result from the WebSocket read half onto an [`InboundFrame`].
pub fn classify_frame(frame: Result<WsMessage, WsError>) -> InboundFrame {
    match frame {
        Ok(WsMessage::Text(text)) => match Message::from_text(&text) {
            Ok(msg) => InboundFrame::Message(msg),
            Err(e) => InboundFrame::Error(e.into()),
        },
        Ok(WsMessage::Binary(bytes)) => match Message::from_slice(&bytes) {
            Ok(msg) => InboundFrame::Message(msg),
            Err(e) => InboundFrame::Error(e.into()),
        },
        Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => InboundFrame::Skip,
        Ok(WsMessage::Close(_)) => InboundFrame::Close,
        Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => InboundFrame::Close,
        Err(e) => InboundFrame::Error(SessionError::Receive(e.to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
