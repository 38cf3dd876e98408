use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use ctoken_primitives::Identity;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{
    error::TransportError,
    network::{EndpointResolver, Message, Session, SessionInfo, Status, Transport},
};

#[derive(Default)]
struct Directory {
    /// pseudonym -> long-term identity
    bindings: HashMap<Identity, Identity>,
    inboxes: HashMap<Identity, mpsc::UnboundedSender<Arc<dyn Session>>>,
}

/// Session hub and endpoint directory shared by every node of a process.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    directory: Arc<Mutex<Directory>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the node `long_term`: its outgoing transport and the stream of
    /// sessions other nodes open with it.
    pub fn register(&self, long_term: Identity) -> (MemoryTransport, IncomingSessions) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.directory.lock().inboxes.insert(long_term.clone(), tx);
        let transport = MemoryTransport {
            me: long_term,
            network: self.clone(),
            sessions: Mutex::new(HashMap::new()),
        };
        (transport, IncomingSessions { rx })
    }

    fn deliver(&self, to: &Identity, session: Arc<dyn Session>) -> Result<(), TransportError> {
        let dir = self.directory.lock();
        let inbox = dir
            .inboxes
            .get(to)
            .ok_or_else(|| TransportError::Unreachable(to.clone()))?;
        inbox
            .send(session)
            .map_err(|_| TransportError::Unreachable(to.clone()))
    }
}

impl EndpointResolver for MemoryNetwork {
    fn resolve(&self, id: &Identity) -> Result<Identity, TransportError> {
        let dir = self.directory.lock();
        if dir.inboxes.contains_key(id) {
            return Ok(id.clone());
        }
        dir.bindings
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(id.clone()))
    }

    fn bind(&self, long_term: &Identity, id: &Identity) {
        if long_term == id {
            return;
        }
        self.directory
            .lock()
            .bindings
            .insert(id.clone(), long_term.clone());
    }
}

/// Sessions opened with one node by its peers.
pub struct IncomingSessions {
    rx: mpsc::UnboundedReceiver<Arc<dyn Session>>,
}

impl IncomingSessions {
    /// Next session; `None` once the network is gone.
    pub async fn accept(&mut self) -> Option<Arc<dyn Session>> {
        self.rx.recv().await
    }
}

/// Outgoing side of one node. Sessions are cached per protocol context and
/// peer until the context is closed, so every step of one transaction talks
/// over the same session.
pub struct MemoryTransport {
    me: Identity,
    network: MemoryNetwork,
    sessions: Mutex<HashMap<(String, Identity), Arc<dyn Session>>>,
}

impl MemoryTransport {
    /// Cached sessions of contexts not closed yet.
    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn session(
        &self,
        context: &str,
        party: &Identity,
    ) -> Result<Arc<dyn Session>, TransportError> {
        let long_term = self.network.resolve(party)?;
        let key = (context.to_string(), long_term.clone());
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(&key) {
            return Ok(session.clone());
        }

        let (local, remote) = MemorySession::pair(context, self.me.clone(), long_term.clone());
        self.network.deliver(&long_term, Arc::new(remote))?;
        trace!(context, peer = %long_term, "session opened");
        let local: Arc<dyn Session> = Arc::new(local);
        sessions.insert(key, local.clone());
        Ok(local)
    }

    fn close(&self, context: &str) {
        self.sessions.lock().retain(|(c, _), _| c != context);
        trace!(context, "sessions closed");
    }
}

/// One end of a duplex in-process channel.
pub struct MemorySession {
    info: SessionInfo,
    tx: mpsc::UnboundedSender<Message>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl MemorySession {
    /// Two connected ends; `a` talks to `b`, each sees the other as caller.
    pub fn pair(context: &str, a: Identity, b: Identity) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let end_a = Self {
            info: SessionInfo {
                id: context.to_string(),
                caller: b,
            },
            tx: a_tx,
            rx: tokio::sync::Mutex::new(a_rx),
        };
        let end_b = Self {
            info: SessionInfo {
                id: context.to_string(),
                caller: a,
            },
            tx: b_tx,
            rx: tokio::sync::Mutex::new(b_rx),
        };
        (end_a, end_b)
    }

    fn push(&self, status: Status, payload: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(Message { status, payload })
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Session for MemorySession {
    fn info(&self) -> SessionInfo {
        self.info.clone()
    }

    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.push(Status::Ok, payload)
    }

    async fn send_error(&self, message: String) -> Result<(), TransportError> {
        self.push(Status::Error, message.into_bytes())
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        self.rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }
}
