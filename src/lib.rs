//! resp-core - server-side RESP (Redis Serialization Protocol) framing,
//! parsing and dispatch.
//!
//! The crate accepts TCP connections, reassembles RESP frames out of
//! arbitrarily fragmented reads, parses both RESP2 and RESP3 values
//! byte-exactly, and hands every frame to an application-provided
//! [`EventHandler`]. Keyspace semantics, reply encoding and anything else
//! command-shaped live above this crate.
//!
//! ```no_run
//! use std::sync::Arc;
//! use resp_core::{EventHandler, RespServer, ServerConfig};
//!
//! struct Sink;
//!
//! #[async_trait::async_trait]
//! impl EventHandler for Sink {}
//!
//! # async fn run() -> Result<(), resp_core::server::Error> {
//! let server = RespServer::new(ServerConfig::default(), Arc::new(Sink));
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod handler;
pub mod parser;
pub mod server;
pub mod value;

mod read_task;

pub use config::{ParserLimits, ServerConfig};
pub use connection::{ConnectionId, ConnectionRecord, DisconnectReason};
pub use handler::{
    ConnectionEvent, DataEvent, DisconnectEvent, ErrorCause, ErrorEvent, EventHandler,
    HandlerResult,
};
pub use parser::FrameReader;
pub use server::RespServer;
pub use value::{DataKind, Dialect, Frame, RespValue, Tag};
