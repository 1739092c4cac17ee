//! Relayed message payloads.
//!
//! A message is one JSON object.  The relay never looks inside it: it only
//! checks that an inbound frame decodes to an object, and re-encodes it once
//! so that every recipient gets the same text.
//!
//! # Why encode once?
//!
//! A broadcast to N peers would otherwise serialize the payload N times while
//! holding the room lock.  [`Message`] stores the encoded text behind an
//! `Arc<str>`, so cloning it into each peer's outbound queue is a reference
//! count bump.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

/// Error returned when an inbound frame is not a well-formed message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object (e.g. an array or a bare
    /// string).
    #[error("message must be a JSON object")]
    NotAnObject,
}

/// One relayed message: an opaque JSON object in encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: Arc<str>,
}

impl Message {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidJson`] for malformed JSON and
    /// [`MessageError::NotAnObject`] for any non-object value.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ducktunnel_core::Message;
    ///
    /// let msg = Message::from_text(r#"{"text":"hi"}"#).unwrap();
    /// assert_eq!(msg.as_text(), r#"{"text":"hi"}"#);
    /// assert!(Message::from_text("[1, 2]").is_err());
    /// ```
    pub fn from_text(text: &str) -> Result<Self, MessageError> {
        Self::from_slice(text.as_bytes())
    }

    /// Decodes a binary frame holding UTF-8 JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Wraps an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        match value {
            Value::Object(fields) => Self::from_fields(&fields),
            _ => Err(MessageError::NotAnObject),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, MessageError> {
        let text = serde_json::to_string(fields)?;
        Ok(Self { text: text.into() })
    }

    /// The encoded JSON text sent to recipients.
    pub fn as_text(&self) -> &str {
        &self.text
    }

    /// Decodes the payload back into a JSON value.
    pub fn to_value(&self) -> Value {
        // The text was produced by `serde_json::to_string` on an object, so it
        // always parses; fall back to `Null` rather than panicking.
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_payload_is_accepted() {
        // Arrange
        let raw = r#"{"type":"offer","offer":{"sdp":"v=0","type":"offer"}}"#;

        // Act
        let msg = Message::from_text(raw).expect("object payload must decode");

        // Assert
        assert_eq!(
            msg.to_value(),
            json!({"type": "offer", "offer": {"sdp": "v=0", "type": "offer"}})
        );
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = Message::from_text("{not json").unwrap_err();
        assert!(matches!(err, MessageError::InvalidJson(_)));
    }

    #[test]
    fn test_non_object_values_are_rejected() {
        for raw in ["[1,2,3]", "\"hello\"", "42", "null", "true"] {
            let err = Message::from_text(raw).unwrap_err();
            assert!(
                matches!(err, MessageError::NotAnObject),
                "{raw} must be rejected as a non-object"
            );
        }
    }

    #[test]
    fn test_empty_object_is_a_valid_message() {
        let msg = Message::from_text("{}").unwrap();
        assert_eq!(msg.as_text(), "{}");
    }

    #[test]
    fn test_binary_frame_decodes_like_text() {
        let from_bytes = Message::from_slice(br#"{"text":"hi"}"#).unwrap();
        let from_text = Message::from_text(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(from_bytes, from_text);
    }

    #[test]
    fn test_invalid_utf8_binary_frame_is_rejected() {
        let err = Message::from_slice(&[0x7b, 0xff, 0xfe, 0x7d]).unwrap_err();
        assert!(matches!(err, MessageError::InvalidJson(_)));
    }

    #[test]
    fn test_whitespace_is_normalised_on_reencode() {
        let msg = Message::from_text("{ \"text\" :   \"hi\" }").unwrap();
        assert_eq!(msg.as_text(), r#"{"text":"hi"}"#);
    }

    #[test]
    fn test_clone_shares_encoded_text() {
        let msg = Message::from_text(r#"{"a":1}"#).unwrap();
        let copy = msg.clone();
        assert!(Arc::ptr_eq(&msg.text, &copy.text));
    }
}
