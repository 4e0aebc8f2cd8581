//! Per-connection task: read, append, drain complete frames, dispatch.
//!
//! One [`ReadTask`] runs for each accepted connection. The loop does not
//! read new bytes until the previous drain finished, which is the only
//! backpressure the core needs; the buffer cap is the hard ceiling behind
//! it. Frames are dispatched strictly in arrival order.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::{ConnectionId, DisconnectReason};
use crate::handler::{
    dispatch_by_kind, DataEvent, DisconnectEvent, ErrorCause, ErrorEvent, EventHandler,
};
use crate::parser::{self, FrameReader};
use crate::server::Registry;
use crate::value::{Dialect, Frame, RespValue};

pub(crate) struct ReadTask<S> {
    id: ConnectionId,
    socket: S,
    reader: FrameReader,
    read_chunk: usize,
    dialect: Dialect,
    handler: Arc<dyn EventHandler>,
    registry: Arc<Registry>,
    close_recv: mpsc::Receiver<DisconnectReason>,
}

impl<S: AsyncRead + Unpin + Send + Sync + 'static> ReadTask<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        id: ConnectionId,
        socket: S,
        reader: FrameReader,
        read_chunk: usize,
        handler: Arc<dyn EventHandler>,
        registry: Arc<Registry>,
        close_recv: mpsc::Receiver<DisconnectReason>,
    ) -> JoinHandle<()> {
        tokio::spawn(
            Self {
                id,
                socket,
                reader,
                read_chunk,
                dialect: Dialect::default(),
                handler,
                registry,
                close_recv,
            }
            .run(),
        )
    }

    async fn run(mut self) {
        let reason = self.serve().await;
        self.registry.remove(self.id);
        debug!(connection = %self.id, %reason, "connection closed");
        let event = DisconnectEvent {
            connection: self.id,
            timestamp: SystemTime::now(),
            dialect: self.dialect,
            reason,
        };
        self.handler.disconnected(&event).await;
        // dropping `self.socket` closes the transport
    }

    async fn serve(&mut self) -> DisconnectReason {
        let mut chunk = vec![0u8; self.read_chunk];
        loop {
            let n = tokio::select! {
                // a pending close wins over further socket reads
                biased;
                reason = self.close_recv.recv() => {
                    return reason.unwrap_or(DisconnectReason::ServerShutdown);
                }
                read = self.socket.read(&mut chunk) => match read {
                    Ok(0) => return DisconnectReason::PeerClosed,
                    Ok(n) => n,
                    Err(err) => return DisconnectReason::Transport(err.to_string()),
                },
            };

            if let Err(err) = self.reader.append(&chunk[..n]) {
                return self.protocol_failure(err).await;
            }

            loop {
                match self.reader.try_next() {
                    Ok(Some(frame)) => {
                        self.reader.advance(frame.consumed());
                        self.dispatch(frame).await;
                    }
                    Ok(None) => break,
                    Err(err) => return self.protocol_failure(err).await,
                }
            }
        }
    }

    /// Reports a malformed-input fault and turns it into the closing
    /// reason. No resynchronization is attempted: after a framing error
    /// the stream position is unrecoverable.
    async fn protocol_failure(&self, err: parser::Error) -> DisconnectReason {
        warn!(connection = %self.id, error = %err, "protocol error");
        let event = ErrorEvent {
            connection: Some(self.id),
            timestamp: SystemTime::now(),
            cause: ErrorCause::Protocol(err.clone()),
        };
        self.handler.error(&event).await;
        DisconnectReason::from(err)
    }

    async fn dispatch(&mut self, frame: Frame) {
        if self.dialect == Dialect::Resp2 && frame.value.requires_resp3() {
            self.dialect = Dialect::Resp3;
            self.registry.set_dialect(self.id, Dialect::Resp3);
        }

        let event = DataEvent {
            connection: self.id,
            timestamp: SystemTime::now(),
            dialect: self.dialect,
            frame,
        };

        if let Some((username, password)) = auth_request(&event.frame.value) {
            if !self.handler.authenticate(&username, &password) {
                warn!(connection = %self.id, username = %username, "authentication rejected");
                let error = ErrorEvent {
                    connection: Some(self.id),
                    timestamp: SystemTime::now(),
                    cause: ErrorCause::AuthRejected { username },
                };
                self.handler.error(&error).await;
                return;
            }
        }

        if let Err(err) = self.handler.data(&event).await {
            self.dispatch_failure(err).await;
        }
        if let Err(err) = dispatch_by_kind(self.handler.as_ref(), &event).await {
            self.dispatch_failure(err).await;
        }
    }

    /// A failing callback is reported and survived; only the peer can
    /// close this connection over it.
    async fn dispatch_failure(&self, err: Box<dyn std::error::Error + Send + Sync>) {
        let event = ErrorEvent {
            connection: Some(self.id),
            timestamp: SystemTime::now(),
            cause: ErrorCause::Dispatch(err.to_string()),
        };
        self.handler.error(&event).await;
    }
}

/// Recognizes `["AUTH", password]` and `["AUTH", username, password]`
/// arrays. Anything else, including AUTH with non-textual arguments,
/// flows through normal dispatch for the command layer to judge.
fn auth_request(value: &RespValue) -> Option<(String, String)> {
    let RespValue::Array(items) = value else {
        return None;
    };
    if !command_text(items.first()?)?.eq_ignore_ascii_case("auth") {
        return None;
    }
    match items.as_slice() {
        [_, password] => Some((String::new(), command_text(password)?)),
        [_, username, password] => Some((command_text(username)?, command_text(password)?)),
        _ => None,
    }
}

fn command_text(value: &RespValue) -> Option<String> {
    match value {
        RespValue::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        RespValue::SimpleString(text) => Some(text.clone()),
        _ => None,
    }
}
