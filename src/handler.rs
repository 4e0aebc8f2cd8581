//! The upward-facing dispatch surface.
//!
//! A consumer implements [`EventHandler`] and receives lifecycle and data
//! notifications for every connection. All methods default to no-ops so an
//! implementation overrides only the kinds it cares about; `data` fires
//! for every frame before the kind-specific method.
//!
//! Dispatch runs synchronously in the owning connection's task: frames
//! from one connection arrive strictly in wire order, and a slow handler
//! only stalls that connection. Expensive work should be posted to its own
//! task.

use std::time::SystemTime;

use async_trait::async_trait;

use crate::connection::{ConnectionId, DisconnectReason};
use crate::parser;
use crate::value::{DataKind, Dialect, Frame};

/// Result of data dispatch callbacks. An `Err` is reported as an
/// [`ErrorCause::Dispatch`] notification and does not close the
/// connection.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A connection was accepted. Precedes every other notification for the
/// same identity.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    pub connection: ConnectionId,
    pub timestamp: SystemTime,
    pub remote_addr: std::net::SocketAddr,
    pub dialect: Dialect,
}

/// A connection ended. Emitted exactly once per identity, after all of its
/// data notifications.
#[derive(Debug, Clone)]
pub struct DisconnectEvent {
    pub connection: ConnectionId,
    pub timestamp: SystemTime,
    pub dialect: Dialect,
    pub reason: DisconnectReason,
}

/// One parsed frame.
#[derive(Debug, Clone)]
pub struct DataEvent {
    pub connection: ConnectionId,
    pub timestamp: SystemTime,
    /// Dialect after this frame was accounted for.
    pub dialect: Dialect,
    /// The typed value together with its original wire bytes.
    pub frame: Frame,
}

/// A fault that did not take the server down.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The connection involved; `None` for accept-loop faults.
    pub connection: Option<ConnectionId>,
    pub timestamp: SystemTime,
    pub cause: ErrorCause,
}

/// What went wrong.
#[derive(Debug, Clone)]
pub enum ErrorCause {
    /// Malformed frame or buffer overflow; the connection closes.
    Protocol(parser::Error),
    /// A transient accept failure; the accept loop continues.
    Accept(String),
    /// A dispatch callback returned an error; the connection lives on.
    Dispatch(String),
    /// The authentication hook rejected an AUTH attempt; the frame was
    /// not dispatched.
    AuthRejected { username: String },
}

/// Callbacks a consumer attaches to the core.
///
/// The per-kind methods mirror [`DataKind`]; the read task invokes `data`
/// and then the method matching `event.frame.value.kind()`.
#[allow(unused_variables)]
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn connected(&self, event: &ConnectionEvent) {}

    async fn disconnected(&self, event: &DisconnectEvent) {}

    async fn error(&self, event: &ErrorEvent) {}

    /// Catch-all, invoked for every frame before the kind-specific method.
    async fn data(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn simple_string(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn error_value(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn integer(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn bulk_string(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn null(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn array(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn double(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn boolean(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn big_number(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn blob_error(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn verbatim_string(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn map(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn set(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn attribute(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    async fn push(&self, event: &DataEvent) -> HandlerResult {
        Ok(())
    }

    /// Authentication hook consulted for AUTH-shaped frames before
    /// dispatch. The default accepts everything, so AUTH frames flow
    /// through as ordinary data unless a policy overrides this.
    fn authenticate(&self, username: &str, password: &str) -> bool {
        true
    }
}

/// Routes one event to the method matching its kind.
pub(crate) async fn dispatch_by_kind(
    handler: &dyn EventHandler,
    event: &DataEvent,
) -> HandlerResult {
    match event.frame.value.kind() {
        DataKind::SimpleString => handler.simple_string(event).await,
        DataKind::Error => handler.error_value(event).await,
        DataKind::Integer => handler.integer(event).await,
        DataKind::BulkString => handler.bulk_string(event).await,
        DataKind::Null => handler.null(event).await,
        DataKind::Array => handler.array(event).await,
        DataKind::Double => handler.double(event).await,
        DataKind::Boolean => handler.boolean(event).await,
        DataKind::BigNumber => handler.big_number(event).await,
        DataKind::BlobError => handler.blob_error(event).await,
        DataKind::VerbatimString => handler.verbatim_string(event).await,
        DataKind::Map => handler.map(event).await,
        DataKind::Set => handler.set(event).await,
        DataKind::Attribute => handler.attribute(event).await,
        DataKind::Push => handler.push(event).await,
    }
}
