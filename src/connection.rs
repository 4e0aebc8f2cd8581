//! Connection identity and lifecycle types.

use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

use uuid::Uuid;

use crate::parser;
use crate::value::Dialect;

/// Server-assigned handle for one accepted connection.
///
/// Assigned at accept time, stable for the connection's lifetime, never
/// reused afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Snapshot of one registered connection.
///
/// The registry holds the authoritative copy; enumeration hands out
/// clones, so a snapshot does not pin the connection alive.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub connected_at: SystemTime,
    /// Client name assigned by an upper layer, if any.
    pub name: Option<String>,
    pub dialect: Dialect,
}

impl ConnectionRecord {
    pub(crate) fn new(id: ConnectionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: SystemTime::now(),
            name: None,
            dialect: Dialect::default(),
        }
    }
}

/// Why a connection ended. Exactly one of these accompanies the single
/// disconnect notification per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer shut the socket down (read returned 0 bytes).
    PeerClosed,
    /// `stop()` closed the connection.
    ServerShutdown,
    /// A targeted `disconnect(id)` closed the connection.
    ByServer,
    /// The peer sent bytes no future input could repair.
    Protocol(parser::Error),
    /// The unparsed-byte cap was exceeded without a complete frame.
    BufferOverflow,
    /// The transport failed (reset, timeout, I/O error).
    Transport(String),
}

impl From<parser::Error> for DisconnectReason {
    fn from(err: parser::Error) -> Self {
        match err {
            parser::Error::BufferOverflow => DisconnectReason::BufferOverflow,
            other => DisconnectReason::Protocol(other),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => f.write_str("peer closed"),
            DisconnectReason::ServerShutdown => f.write_str("server shutdown"),
            DisconnectReason::ByServer => f.write_str("disconnected by server"),
            DisconnectReason::Protocol(err) => write!(f, "protocol error: {err}"),
            DisconnectReason::BufferOverflow => f.write_str("buffer overflow"),
            DisconnectReason::Transport(err) => write!(f, "transport error: {err}"),
        }
    }
}
