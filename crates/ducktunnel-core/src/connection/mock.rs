//! In-memory connection for tests and benchmarks.
//!
//! Records every delivered message instead of writing to a socket.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{Connection, ConnectionId, DeliveryError, Message};

/// A [`Connection`] that stores delivered messages in memory.
pub struct MockConnection {
    id: ConnectionId,
    received: Mutex<Vec<Message>>,
    failing: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockConnection {
    /// Creates a connection that accepts every delivery.
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            received: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Creates a connection whose every delivery fails with
    /// [`DeliveryError::Closed`].
    pub fn failing() -> Self {
        let conn = Self::new();
        conn.set_failing(true);
        conn
    }

    /// Makes subsequent deliveries fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything delivered so far, oldest first.
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// Delivered payloads as encoded JSON text, oldest first.
    pub fn received_texts(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .map(|m| m.as_text().to_string())
            .collect()
    }

    /// Number of times [`Connection::close`] was called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Closed);
        }
        self.received.lock().push(message.clone());
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(raw: &str) -> Message {
        Message::from_text(raw).expect("test payload must be a JSON object")
    }

    #[test]
    fn test_mock_connection_records_in_order() {
        // Arrange
        let conn = MockConnection::new();

        // Act
        conn.send(&msg(r#"{"n":1}"#)).unwrap();
        conn.send(&msg(r#"{"n":2}"#)).unwrap();

        // Assert
        assert_eq!(conn.received_texts(), vec![r#"{"n":1}"#, r#"{"n":2}"#]);
    }

    #[test]
    fn test_failing_mock_connection_rejects_and_records_nothing() {
        let conn = MockConnection::failing();

        let result = conn.send(&msg(r#"{"n":1}"#));

        assert_eq!(result, Err(DeliveryError::Closed));
        assert!(conn.received().is_empty());
    }

    #[test]
    fn test_mock_connection_counts_close_calls() {
        let conn = MockConnection::new();
        conn.close();
        conn.close();
        assert_eq!(conn.close_calls(), 2);
    }
}
