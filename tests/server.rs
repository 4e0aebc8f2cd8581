//! End-to-end scenarios over real TCP connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use resp_core::{
    ConnectionEvent, ConnectionId, DataEvent, DataKind, Dialect, DisconnectEvent,
    DisconnectReason, ErrorCause, ErrorEvent, EventHandler, HandlerResult, RespServer, RespValue,
    ServerConfig,
};

/// Everything the core emitted, in emission order per connection.
#[derive(Debug)]
enum Event {
    Connected(ConnectionId),
    Data(DataEvent),
    Disconnected(DisconnectEvent),
    Error(ErrorEvent),
}

/// Handler that forwards every notification into a channel the test
/// drains.
struct Recording {
    events: mpsc::UnboundedSender<Event>,
    /// Password accepted by the auth hook; `None` accepts everything.
    required_password: Option<String>,
    /// Integer value whose dispatch fails, to exercise error reporting.
    poison_integer: Option<i64>,
}

impl Recording {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        Self::with_options(None, None)
    }

    fn with_options(
        required_password: Option<String>,
        poison_integer: Option<i64>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (events, recv) = mpsc::unbounded_channel();
        (Arc::new(Self { events, required_password, poison_integer }), recv)
    }
}

#[async_trait]
impl EventHandler for Recording {
    async fn connected(&self, event: &ConnectionEvent) {
        let _ = self.events.send(Event::Connected(event.connection));
    }

    async fn disconnected(&self, event: &DisconnectEvent) {
        let _ = self.events.send(Event::Disconnected(event.clone()));
    }

    async fn error(&self, event: &ErrorEvent) {
        let _ = self.events.send(Event::Error(event.clone()));
    }

    async fn data(&self, event: &DataEvent) -> HandlerResult {
        if let (Some(poison), RespValue::Integer(n)) =
            (self.poison_integer, &event.frame.value)
        {
            if *n == poison {
                let _ = self.events.send(Event::Data(event.clone()));
                return Err("poisoned".into());
            }
        }
        let _ = self.events.send(Event::Data(event.clone()));
        Ok(())
    }

    fn authenticate(&self, _username: &str, password: &str) -> bool {
        match &self.required_password {
            Some(required) => password == required,
            None => true,
        }
    }
}

async fn start_server(handler: Arc<Recording>) -> (RespServer, SocketAddr) {
    start_server_with(ServerConfig { port: 0, ..ServerConfig::default() }, handler).await
}

async fn start_server_with(
    config: ServerConfig,
    handler: Arc<Recording>,
) -> (RespServer, SocketAddr) {
    let server = RespServer::new(config, handler);
    server.start().await.unwrap();
    let bound = server.local_addrs().await[0];
    let addr = SocketAddr::from(([127, 0, 0, 1], bound.port()));
    (server, addr)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn expect_connected(events: &mut mpsc::UnboundedReceiver<Event>) -> ConnectionId {
    match next_event(events).await {
        Event::Connected(id) => id,
        other => panic!("expected Connected, got {other:?}"),
    }
}

async fn expect_data(events: &mut mpsc::UnboundedReceiver<Event>) -> DataEvent {
    match next_event(events).await {
        Event::Data(event) => event,
        other => panic!("expected Data, got {other:?}"),
    }
}

async fn expect_disconnected(events: &mut mpsc::UnboundedReceiver<Event>) -> DisconnectEvent {
    match next_event(events).await {
        Event::Disconnected(event) => event,
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn simple_string_is_dispatched() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;

    client.write_all(b"+OK\r\n").await.unwrap();
    let event = expect_data(&mut events).await;
    assert_eq!(event.connection, id);
    assert_eq!(event.frame.value, RespValue::SimpleString("OK".into()));
    assert_eq!(event.frame.raw, b"+OK\r\n");
    assert_eq!(event.dialect, Dialect::Resp2);

    server.stop().await;
}

#[tokio::test]
async fn bulk_string_payload_is_byte_exact() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    expect_connected(&mut events).await;

    client.write_all(b"$6\r\nfoobar\r\n").await.unwrap();
    let event = expect_data(&mut events).await;
    assert_eq!(
        event.frame.value,
        RespValue::BulkString(vec![0x66, 0x6f, 0x6f, 0x62, 0x61, 0x72])
    );
    assert_eq!(event.frame.raw, b"$6\r\nfoobar\r\n");

    server.stop().await;
}

#[tokio::test]
async fn array_of_bulk_strings() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    expect_connected(&mut events).await;

    client.write_all(b"*2\r\n$3\r\nget\r\n$3\r\nkey\r\n").await.unwrap();
    let event = expect_data(&mut events).await;
    assert_eq!(
        event.frame.value,
        RespValue::Array(vec![
            RespValue::BulkString(b"get".to_vec()),
            RespValue::BulkString(b"key".to_vec()),
        ])
    );
    assert_eq!(event.frame.value.kind(), DataKind::Array);

    server.stop().await;
}

#[tokio::test]
async fn frame_split_across_two_writes() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    expect_connected(&mut events).await;

    client.write_all(b"$11\r\nhel").await.unwrap();
    client.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    client.write_all(b"lo world\r\n").await.unwrap();

    let event = expect_data(&mut events).await;
    assert_eq!(event.frame.value, RespValue::BulkString(b"hello world".to_vec()));

    server.stop().await;
}

#[tokio::test]
async fn null_bulk_string() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    expect_connected(&mut events).await;

    client.write_all(b"$-1\r\n").await.unwrap();
    let event = expect_data(&mut events).await;
    assert_eq!(event.frame.value, RespValue::Null);
    assert_eq!(event.frame.value.kind(), DataKind::Null);

    server.stop().await;
}

#[tokio::test]
async fn unknown_tag_closes_the_connection() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;

    client.write_all(b"@invalid\r\n").await.unwrap();

    match next_event(&mut events).await {
        Event::Error(event) => {
            assert_eq!(event.connection, Some(id));
            assert!(matches!(event.cause, ErrorCause::Protocol(_)));
        }
        other => panic!("expected Error, got {other:?}"),
    }
    let disconnect = expect_disconnected(&mut events).await;
    assert_eq!(disconnect.connection, id);
    assert_eq!(
        disconnect.reason.to_string(),
        "protocol error: unknown type 0x40"
    );

    // the peer observes the close
    let mut buf = [0u8; 8];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);

    server.stop().await;
}

#[tokio::test]
async fn pipelined_frames_keep_order_per_connection() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = TcpStream::connect(addr).await.unwrap();
        expect_connected(&mut events).await;
        client.write_all(b":1\r\n:2\r\n:3\r\n").await.unwrap();
        clients.push(client);
    }

    let mut per_connection: std::collections::HashMap<ConnectionId, Vec<i64>> =
        std::collections::HashMap::new();
    for _ in 0..9 {
        let event = expect_data(&mut events).await;
        match event.frame.value {
            RespValue::Integer(n) => {
                per_connection.entry(event.connection).or_default().push(n)
            }
            other => panic!("expected an integer, got {other:?}"),
        }
    }

    assert_eq!(per_connection.len(), 3);
    for values in per_connection.values() {
        assert_eq!(values, &[1, 2, 3]);
    }

    server.stop().await;
}

#[tokio::test]
async fn malformed_input_does_not_affect_other_connections() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut bad = TcpStream::connect(addr).await.unwrap();
    let bad_id = expect_connected(&mut events).await;
    let mut good = TcpStream::connect(addr).await.unwrap();
    let good_id = expect_connected(&mut events).await;

    bad.write_all(b"*1\r\n$abc\r\n").await.unwrap();
    loop {
        match next_event(&mut events).await {
            Event::Disconnected(event) => {
                assert_eq!(event.connection, bad_id);
                assert!(matches!(event.reason, DisconnectReason::Protocol(_)));
                break;
            }
            Event::Error(_) => continue,
            other => panic!("expected Error/Disconnected, got {other:?}"),
        }
    }

    good.write_all(b":42\r\n").await.unwrap();
    let event = expect_data(&mut events).await;
    assert_eq!(event.connection, good_id);
    assert_eq!(event.frame.value, RespValue::Integer(42));

    server.stop().await;
}

#[tokio::test]
async fn buffer_overflow_closes_the_connection() {
    let config = ServerConfig { port: 0, max_buffer_bytes: 64, ..ServerConfig::default() };
    let (handler, mut events) = Recording::with_options(None, None);
    let (server, addr) = start_server_with(config, handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;

    // a simple-string line that never terminates
    client.write_all(&[b'+'; 256]).await.unwrap();

    loop {
        match next_event(&mut events).await {
            Event::Disconnected(event) => {
                assert_eq!(event.connection, id);
                assert_eq!(event.reason, DisconnectReason::BufferOverflow);
                assert_eq!(event.reason.to_string(), "buffer overflow");
                break;
            }
            Event::Error(event) => {
                assert!(matches!(
                    event.cause,
                    ErrorCause::Protocol(resp_core::parser::Error::BufferOverflow)
                ));
            }
            other => panic!("expected Error/Disconnected, got {other:?}"),
        }
    }

    server.stop().await;
}

#[tokio::test]
async fn admin_operations() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let _first = TcpStream::connect(addr).await.unwrap();
    let first_id = expect_connected(&mut events).await;
    let mut second = TcpStream::connect(addr).await.unwrap();
    let second_id = expect_connected(&mut events).await;

    assert_eq!(server.connected_count(), 2);
    let records = server.list_connections();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.name.is_none()));
    assert!(records.iter().any(|record| record.id == first_id));

    assert!(server.set_client_name(second_id, "worker-1"));
    let named = server
        .list_connections()
        .into_iter()
        .find(|record| record.id == second_id)
        .unwrap();
    assert_eq!(named.name.as_deref(), Some("worker-1"));

    // targeted disconnect
    assert!(server.disconnect(second_id));
    let disconnect = expect_disconnected(&mut events).await;
    assert_eq!(disconnect.connection, second_id);
    assert_eq!(disconnect.reason, DisconnectReason::ByServer);
    assert_eq!(disconnect.reason.to_string(), "disconnected by server");

    // the peer observes the close
    let mut buf = [0u8; 8];
    assert_eq!(second.read(&mut buf).await.unwrap(), 0);

    // second disconnect of the same identity is a clean miss
    assert!(!server.disconnect(second_id));
    assert_eq!(server.connected_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_connections() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    // starting a running server is a no-op
    server.start().await.unwrap();

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;

    server.stop().await;
    let disconnect = expect_disconnected(&mut events).await;
    assert_eq!(disconnect.connection, id);
    assert_eq!(disconnect.reason, DisconnectReason::ServerShutdown);
    assert_eq!(server.connected_count(), 0);

    let mut buf = [0u8; 8];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);

    // a second stop is a no-op
    server.stop().await;
}

#[tokio::test]
async fn peer_close_reports_the_reason() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;
    drop(client);

    let disconnect = expect_disconnected(&mut events).await;
    assert_eq!(disconnect.connection, id);
    assert_eq!(disconnect.reason, DisconnectReason::PeerClosed);
    assert_eq!(server.connected_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn resp3_frame_upgrades_the_dialect() {
    let (handler, mut events) = Recording::new();
    let (server, addr) = start_server(handler).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;

    client.write_all(b":1\r\n").await.unwrap();
    assert_eq!(expect_data(&mut events).await.dialect, Dialect::Resp2);

    client.write_all(b"#t\r\n").await.unwrap();
    assert_eq!(expect_data(&mut events).await.dialect, Dialect::Resp3);

    let record = server
        .list_connections()
        .into_iter()
        .find(|record| record.id == id)
        .unwrap();
    assert_eq!(record.dialect, Dialect::Resp3);

    server.stop().await;
}

#[tokio::test]
async fn auth_hook_gates_auth_frames() {
    let (handler, mut events) = Recording::with_options(Some("sekret".into()), None);
    let (server, addr) = start_server_with(
        ServerConfig { port: 0, ..ServerConfig::default() },
        handler,
    )
    .await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;

    // rejected: suppressed, reported, connection survives
    client.write_all(b"*2\r\n$4\r\nAUTH\r\n$5\r\nwrong\r\n").await.unwrap();
    match next_event(&mut events).await {
        Event::Error(event) => {
            assert_eq!(event.connection, Some(id));
            assert!(matches!(event.cause, ErrorCause::AuthRejected { .. }));
        }
        other => panic!("expected Error, got {other:?}"),
    }

    // accepted: the frame flows through normal dispatch
    client.write_all(b"*2\r\n$4\r\nAUTH\r\n$6\r\nsekret\r\n").await.unwrap();
    let event = expect_data(&mut events).await;
    assert_eq!(event.frame.value.kind(), DataKind::Array);

    server.stop().await;
}

#[tokio::test]
async fn dispatch_failures_do_not_close_the_connection() {
    let (handler, mut events) = Recording::with_options(None, Some(13));
    let (server, addr) = start_server_with(
        ServerConfig { port: 0, ..ServerConfig::default() },
        handler,
    )
    .await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = expect_connected(&mut events).await;

    client.write_all(b":13\r\n").await.unwrap();
    let poisoned = expect_data(&mut events).await;
    assert_eq!(poisoned.frame.value, RespValue::Integer(13));
    match next_event(&mut events).await {
        Event::Error(event) => {
            assert_eq!(event.connection, Some(id));
            assert!(matches!(event.cause, ErrorCause::Dispatch(_)));
        }
        other => panic!("expected Error, got {other:?}"),
    }

    client.write_all(b":14\r\n").await.unwrap();
    assert_eq!(expect_data(&mut events).await.frame.value, RespValue::Integer(14));

    server.stop().await;
}
