//! Listener, connection registry and administrative operations.
//!
//! The registry is the only cross-task shared structure. It sits behind a
//! single mutex; every critical section is an insert, remove, field
//! update or copy-out snapshot, and no lock is ever held across I/O.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnectionId, ConnectionRecord, DisconnectReason};
use crate::handler::{ConnectionEvent, ErrorCause, ErrorEvent, EventHandler};
use crate::parser::FrameReader;
use crate::read_task::ReadTask;
use crate::value::Dialect;

/// Listener-level failures. Everything that happens after a successful
/// bind is reported through the dispatch surface instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Registry entry: the authoritative record plus the handles needed to
/// close the connection.
pub(crate) struct Registered {
    record: ConnectionRecord,
    close: mpsc::Sender<DisconnectReason>,
    task: Option<JoinHandle<()>>,
}

/// Identity-to-record mapping shared by the listener and the read tasks.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Mutex<HashMap<ConnectionId, Registered>>,
}

impl Registry {
    pub(crate) fn insert(&self, record: ConnectionRecord, close: mpsc::Sender<DisconnectReason>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(record.id, Registered { record, close, task: None });
    }

    /// Parks the task handle with its entry. The entry may already be
    /// gone if the connection was torn down during registration.
    fn attach_task(&self, id: ConnectionId, task: JoinHandle<()>) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&id) {
            entry.task = Some(task);
        }
    }

    /// Removes an entry; the first caller wins, every later call gets
    /// `None`.
    pub(crate) fn remove(&self, id: ConnectionId) -> Option<Registered> {
        self.entries.lock().unwrap().remove(&id)
    }

    pub(crate) fn set_dialect(&self, id: ConnectionId, dialect: Dialect) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&id) {
            entry.record.dialect = dialect;
        }
    }

    fn set_name(&self, id: ConnectionId, name: String) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.record.name = Some(name);
                true
            }
            None => false,
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn snapshot(&self) -> Vec<ConnectionRecord> {
        let entries = self.entries.lock().unwrap();
        entries.values().map(|entry| entry.record.clone()).collect()
    }

    fn drain(&self) -> Vec<Registered> {
        let mut entries = self.entries.lock().unwrap();
        entries.drain().map(|(_, entry)| entry).collect()
    }
}

struct ListenState {
    running: bool,
    shutdown: Option<broadcast::Sender<()>>,
    accept_tasks: Vec<JoinHandle<()>>,
    local_addrs: Vec<SocketAddr>,
}

/// The RESP core server: accept loops, registry, shutdown.
///
/// Cheap administrative operations (`connected_count`,
/// `list_connections`, `disconnect`, `set_client_name`) are synchronous
/// and never block on I/O.
pub struct RespServer {
    config: ServerConfig,
    handler: Arc<dyn EventHandler>,
    registry: Arc<Registry>,
    state: tokio::sync::Mutex<ListenState>,
}

impl RespServer {
    pub fn new(config: ServerConfig, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            config,
            handler,
            registry: Arc::new(Registry::default()),
            state: tokio::sync::Mutex::new(ListenState {
                running: false,
                shutdown: None,
                accept_tasks: Vec::new(),
                local_addrs: Vec::new(),
            }),
        }
    }

    /// Binds the configured port and starts accepting. A second call on a
    /// running server is a no-op.
    ///
    /// IPv4 on all interfaces is mandatory; the IPv6 listener is skipped
    /// when the host already routes v6 clients through a dual-stack v4
    /// bind.
    pub async fn start(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.running {
            return Ok(());
        }

        let v4_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port));
        let v4 = TcpListener::bind(v4_addr)
            .await
            .map_err(|source| Error::Bind { addr: v4_addr, source })?;
        let mut listeners = vec![v4];

        let v6_addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, self.config.port));
        match TcpListener::bind(v6_addr).await {
            Ok(listener) => listeners.push(listener),
            Err(err) => debug!(%v6_addr, error = %err, "skipping IPv6 listener"),
        }

        let (shutdown, _) = broadcast::channel(1);
        state.local_addrs =
            listeners.iter().filter_map(|listener| listener.local_addr().ok()).collect();
        for listener in listeners {
            state.accept_tasks.push(tokio::spawn(accept_loop(
                listener,
                Arc::clone(&self.handler),
                Arc::clone(&self.registry),
                self.config.clone(),
                shutdown.subscribe(),
            )));
        }
        state.shutdown = Some(shutdown);
        state.running = true;
        info!(port = self.config.port, "listener started");
        Ok(())
    }

    /// Stops accepting, closes every connection with reason
    /// `server shutdown`, and waits for their tasks. Idempotent; after it
    /// returns no further connected or data notifications are emitted.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if !state.running {
            return;
        }
        state.running = false;
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(());
        }
        for task in state.accept_tasks.drain(..) {
            let _ = task.await;
        }
        state.local_addrs.clear();

        for mut entry in self.registry.drain() {
            let _ = entry.close.try_send(DisconnectReason::ServerShutdown);
            if let Some(task) = entry.task.take() {
                let _ = task.await;
            }
        }
        info!("listener stopped");
    }

    /// Number of currently registered connections.
    pub fn connected_count(&self) -> usize {
        self.registry.count()
    }

    /// Copy-out snapshot of the registry.
    pub fn list_connections(&self) -> Vec<ConnectionRecord> {
        self.registry.snapshot()
    }

    /// Closes one connection with reason `disconnected by server`.
    /// Returns whether the identity was registered; a connection that
    /// already closed yields `false` and no second disconnect
    /// notification.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        match self.registry.remove(id) {
            Some(entry) => {
                let _ = entry.close.try_send(DisconnectReason::ByServer);
                true
            }
            None => false,
        }
    }

    /// Assigns the administrative client name on a live connection.
    pub fn set_client_name(&self, id: ConnectionId, name: impl Into<String>) -> bool {
        self.registry.set_name(id, name.into())
    }

    /// Addresses actually bound, useful with port 0.
    pub async fn local_addrs(&self) -> Vec<SocketAddr> {
        self.state.lock().await.local_addrs.clone()
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn EventHandler>,
    registry: Arc<Registry>,
    config: ServerConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, remote_addr)) => {
                    register(socket, remote_addr, &handler, &registry, &config).await;
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    let event = ErrorEvent {
                        connection: None,
                        timestamp: SystemTime::now(),
                        cause: ErrorCause::Accept(err.to_string()),
                    };
                    handler.error(&event).await;
                }
            },
        }
    }
}

/// Registration order is the ordering contract: insert the record, emit
/// `connected`, only then spawn the read task.
async fn register(
    socket: TcpStream,
    remote_addr: SocketAddr,
    handler: &Arc<dyn EventHandler>,
    registry: &Arc<Registry>,
    config: &ServerConfig,
) {
    if let Err(err) = socket.set_nodelay(true) {
        debug!(error = %err, "set_nodelay failed");
    }

    let id = ConnectionId::new();
    let (close_send, close_recv) = mpsc::channel(1);
    registry.insert(ConnectionRecord::new(id, remote_addr), close_send);
    debug!(connection = %id, %remote_addr, "connection accepted");

    let event = ConnectionEvent {
        connection: id,
        timestamp: SystemTime::now(),
        remote_addr,
        dialect: Dialect::default(),
    };
    handler.connected(&event).await;

    let reader = FrameReader::new(config.max_buffer_bytes, config.limits.clone());
    let task = ReadTask::spawn(
        id,
        socket,
        reader,
        config.read_chunk_bytes,
        Arc::clone(handler),
        Arc::clone(registry),
        close_recv,
    );
    registry.attach_task(id, task);
}
