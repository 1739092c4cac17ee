//! Criterion benchmarks for room fan-out.
//!
//! Measures how long one `Room::broadcast` holds the room lock as the member
//! count grows, using in-memory connections so only the core is timed.
//!
//! Run with:
//! ```bash
//! cargo bench --package ducktunnel-core --bench broadcast_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ducktunnel_core::connection::mock::MockConnection;
use ducktunnel_core::{Connection, ConnectionId, Message, Registry, Room, RoomId};

/// A connection that accepts and discards every message, so the benchmark
/// does not grow a recording buffer.
struct NullConnection(ConnectionId);

impl Connection for NullConnection {
    fn id(&self) -> ConnectionId {
        self.0
    }

    fn send(&self, message: &Message) -> Result<(), ducktunnel_core::DeliveryError> {
        black_box(message);
        Ok(())
    }

    fn close(&self) {}
}

fn room_with_members(n: usize) -> Room {
    let room = Room::new(RoomId::new("bench").unwrap());
    for _ in 0..n {
        room.join(Arc::new(NullConnection(ConnectionId::new())));
    }
    room
}

fn signaling_message() -> Message {
    Message::from_text(
        r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 2122260223 192.168.1.2 54400 typ host","sdpMid":"0","sdpMLineIndex":0}}"#,
    )
    .unwrap()
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("room_broadcast");
    let msg = signaling_message();
    let sender = ConnectionId::new();

    for members in [2usize, 8, 32, 128] {
        let room = room_with_members(members);
        group.bench_with_input(BenchmarkId::from_parameter(members), &members, |b, _| {
            b.iter(|| black_box(room.broadcast(&sender, &msg)));
        });
    }
    group.finish();
}

fn bench_get_or_create(c: &mut Criterion) {
    let registry = Registry::new();
    let existing = RoomId::new("existing").unwrap();
    registry.get_or_create(&existing);

    c.bench_function("registry_get_existing", |b| {
        b.iter(|| black_box(registry.get_or_create(&existing)));
    });
}

fn bench_decode(c: &mut Criterion) {
    let raw = signaling_message().as_text().to_string();
    c.bench_function("message_from_text", |b| {
        b.iter(|| black_box(Message::from_text(black_box(&raw)).unwrap()));
    });
}

fn bench_join_leave(c: &mut Criterion) {
    let room = room_with_members(32);
    let conn = Arc::new(MockConnection::new());
    c.bench_function("room_join_leave", |b| {
        b.iter(|| {
            room.join(conn.clone());
            room.leave(&conn.id());
        });
    });
}

criterion_group!(
    benches,
    bench_broadcast,
    bench_get_or_create,
    bench_decode,
    bench_join_leave
);
criterion_main!(benches);
