//! Session orchestration
//!
//! One worker task per open sheet owns the [`DocumentStore`], the
//! [`UndoHistory`] and the live connection list. Everything that touches
//! them (joins, edits, undos, leaves) arrives as a command on a single
//! queue, so edits are applied one at a time in arrival order and a
//! broadcast can never race a disconnect.

use crate::config::SyncConfig;
use crate::connection::{Connection, ConnectionId, ConnectionState};
use crate::history::UndoHistory;
use crate::protocol::{ClientMessage, RejectReason, ServerMessage};
use crate::store::DocumentStore;
use crate::{Result, SyncError};
use sheet_common::LogSanitizer;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

enum Command {
    Join {
        reply: oneshot::Sender<Result<(ConnectionId, mpsc::Receiver<ServerMessage>)>>,
    },
    Message {
        from: ConnectionId,
        message: ClientMessage,
    },
    RawMessage {
        from: ConnectionId,
        bytes: Vec<u8>,
    },
    Leave {
        id: ConnectionId,
        ack: Option<oneshot::Sender<()>>,
    },
    Authenticate {
        password: String,
        reply: oneshot::Sender<bool>,
    },
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub name: String,
    pub connections: usize,
    pub version: Option<u64>,
    pub cells: usize,
    pub undo_depth: usize,
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    name: Arc<str>,
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Start the worker task for a store. Must be called inside a tokio runtime.
    pub fn spawn(name: impl Into<String>, store: DocumentStore, config: &SyncConfig) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = mpsc::channel(config.command_queue_capacity);

        let worker = SessionWorker::new(name.clone(), store, config);
        tokio::spawn(worker.run(rx));

        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the worker has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Register a new connection. Its first message is the snapshot.
    pub async fn join(&self) -> Result<Connection> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Join { reply }).await?;
        let (id, outbox) = rx.await.map_err(|_| SyncError::SessionClosed)??;
        Ok(Connection::new(id, outbox, self.clone()))
    }

    pub async fn submit(&self, from: ConnectionId, message: ClientMessage) -> Result<()> {
        self.command(Command::Message { from, message }).await
    }

    pub async fn submit_bytes(&self, from: ConnectionId, bytes: Vec<u8>) -> Result<()> {
        self.command(Command::RawMessage { from, bytes }).await
    }

    /// Remove a connection, waiting until the session has done so
    pub async fn leave(&self, id: ConnectionId) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.command(Command::Leave { id, ack: Some(ack) }).await?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    /// Best-effort leave for contexts that cannot await. If the queue is
    /// full, the session notices the closed outbox on its next send instead.
    pub(crate) fn try_leave(&self, id: ConnectionId) {
        if let Err(e) = self.tx.try_send(Command::Leave { id, ack: None }) {
            tracing::debug!("[{}] Deferred leave for {}: {}", self.name, id, e);
        }
    }

    /// Check a password against the sheet as persisted
    pub async fn authenticate(&self, password: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Authenticate {
            password: password.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    pub async fn stats(&self) -> Result<SessionStats> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Stats { reply }).await?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    /// Save and stop the worker. Connections see their stream end.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| SyncError::SessionClosed)?
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SyncError::SessionClosed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Session-side record of a connection
struct Peer {
    id: ConnectionId,
    outbox: mpsc::Sender<ServerMessage>,
    state: ConnectionState,
}

struct SessionWorker {
    name: Arc<str>,
    store: DocumentStore,
    history: UndoHistory,
    /// Join order, used for fan-out
    peers: Vec<Peer>,
    outbox_capacity: usize,
    reject_stale_edits: bool,
    sanitizer: LogSanitizer,
}

impl SessionWorker {
    fn new(name: Arc<str>, store: DocumentStore, config: &SyncConfig) -> Self {
        let sanitizer = LogSanitizer::new().with_secret(store.password());
        Self {
            name,
            store,
            history: UndoHistory::with_limit(config.undo_limit),
            peers: Vec::new(),
            outbox_capacity: config.outbox_capacity,
            reject_stale_edits: config.reject_stale_edits,
            sanitizer,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::info!(
            "[{}] Session started at version {:?}",
            self.name,
            self.store.version()
        );

        while let Some(command) = rx.recv().await {
            match command {
                Command::Join { reply } => {
                    let _ = reply.send(self.join());
                }
                Command::Message { from, message } => self.handle_message(message, from),
                Command::RawMessage { from, bytes } => self.handle_raw(&bytes, from),
                Command::Leave { id, ack } => {
                    self.remove_peer(id, "left");
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                Command::Authenticate { password, reply } => {
                    let _ = reply.send(self.store.authenticate(&password));
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                Command::Shutdown { reply } => {
                    rx.close();
                    let saved = self.final_save();
                    // Close every outbox before acknowledging.
                    self.peers.clear();
                    let _ = reply.send(saved);
                    tracing::info!("[{}] Session shut down", self.name);
                    return;
                }
            }
        }

        // Every handle is gone.
        if let Err(e) = self.final_save() {
            tracing::error!("[{}] Final save failed: {}", self.name, e);
        }
        self.peers.clear();
        tracing::info!("[{}] Session stopped", self.name);
    }

    fn join(&mut self) -> Result<(ConnectionId, mpsc::Receiver<ServerMessage>)> {
        let (version, cells) = self.store.snapshot().ok_or(SyncError::NotLoaded)?;

        let id = ConnectionId::next();
        let (outbox, inbox) = mpsc::channel(self.outbox_capacity);
        let mut peer = Peer {
            id,
            outbox,
            state: ConnectionState::Joining,
        };

        // Fresh channel with capacity >= 1, so this cannot fail.
        let _ = peer.outbox.try_send(ServerMessage::Snapshot { version, cells });
        peer.state = ConnectionState::Active;
        self.peers.push(peer);

        tracing::info!(
            "[{}] {} joined at version {} ({} connected)",
            self.name,
            id,
            version,
            self.peers.len()
        );
        Ok((id, inbox))
    }

    fn handle_message(&mut self, message: ClientMessage, from: ConnectionId) {
        if !self.is_active(from) {
            tracing::debug!("[{}] Ignoring message from departed {}", self.name, from);
            return;
        }

        match message {
            ClientMessage::EditCell {
                cell,
                contents,
                base_version,
            } => self.apply_edit(from, cell, contents, base_version),
            ClientMessage::Undo => self.apply_undo(from),
            ClientMessage::Save => self.save_requested(from),
            ClientMessage::Ping => self.send_to(from, ServerMessage::Pong),
        }
    }

    fn handle_raw(&mut self, bytes: &[u8], from: ConnectionId) {
        match ClientMessage::from_bytes(bytes) {
            Ok(message) => self.handle_message(message, from),
            Err(e) => {
                let payload = String::from_utf8_lossy(bytes);
                tracing::warn!(
                    "[{}] Undecodable message from {}: {} ({})",
                    self.name,
                    from,
                    e,
                    self.sanitizer.sanitize(&payload)
                );
                self.send_to(
                    from,
                    ServerMessage::Error {
                        code: "invalid_message".to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    fn apply_edit(
        &mut self,
        from: ConnectionId,
        cell: String,
        contents: String,
        base_version: Option<u64>,
    ) {
        let Some(current_version) = self.store.version() else {
            self.reject(from, Some(cell), RejectReason::NotLoaded);
            return;
        };

        // An empty name has no line in the sheet file, so it could never be saved.
        if cell.is_empty() {
            self.reject(from, Some(cell), RejectReason::InvalidCell);
            return;
        }

        if self.reject_stale_edits {
            if let Some(base) = base_version.filter(|base| *base < current_version) {
                tracing::debug!(
                    "[{}] Stale edit of {} from {} (base {}, current {})",
                    self.name,
                    cell,
                    from,
                    base,
                    current_version
                );
                self.reject(
                    from,
                    Some(cell),
                    RejectReason::StaleVersion {
                        current: current_version,
                    },
                );
                return;
            }
        }

        let version = match self.store.increment_version() {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("[{}] Refusing edit of {} from {}: {}", self.name, cell, from, e);
                self.reject(from, Some(cell), RejectReason::VersionExhausted);
                return;
            }
        };

        // Record before mutating: undo must restore the pre-edit value.
        let prior = self.store.get_cell(&cell);
        let evicted = self.history.record(cell.clone(), prior.clone());
        self.store.update_cell(cell.clone(), contents.clone());

        if self.store.save().is_err() {
            self.store.update_cell(cell.clone(), prior);
            self.store.rewind_version(current_version);
            self.history.rollback_record(evicted);
            self.reject(from, Some(cell), RejectReason::WriteFailure);
            return;
        }

        tracing::debug!("[{}] {} set {} at version {}", self.name, from, cell, version);

        self.send_to(
            from,
            ServerMessage::EditAccepted {
                cell: cell.clone(),
                version,
            },
        );
        self.broadcast(
            Some(from),
            ServerMessage::CellChanged {
                cell,
                contents,
                version,
            },
        );
    }

    /// Undo consumes a version and is broadcast to everyone, the requester
    /// included, since nobody holds the restored value locally.
    fn apply_undo(&mut self, from: ConnectionId) {
        let Some(current_version) = self.store.version() else {
            self.reject(from, None, RejectReason::NotLoaded);
            return;
        };

        let Some(entry) = self.history.undo() else {
            self.reject(from, None, RejectReason::NothingToUndo);
            return;
        };

        let version = match self.store.increment_version() {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("[{}] Refusing undo from {}: {}", self.name, from, e);
                self.history.restore(entry);
                self.reject(from, None, RejectReason::VersionExhausted);
                return;
            }
        };

        let replaced = self.store.get_cell(&entry.cell);
        self.store
            .update_cell(entry.cell.clone(), entry.prior_contents.clone());

        if self.store.save().is_err() {
            self.store.update_cell(entry.cell.clone(), replaced);
            self.store.rewind_version(current_version);
            let cell = entry.cell.clone();
            self.history.restore(entry);
            self.reject(from, Some(cell), RejectReason::WriteFailure);
            return;
        }

        tracing::debug!(
            "[{}] {} undid {} at version {}",
            self.name,
            from,
            entry.cell,
            version
        );

        self.broadcast(
            None,
            ServerMessage::CellChanged {
                cell: entry.cell,
                contents: entry.prior_contents,
                version,
            },
        );
    }

    fn save_requested(&mut self, from: ConnectionId) {
        let Some(version) = self.store.version() else {
            self.reject(from, None, RejectReason::NotLoaded);
            return;
        };

        match self.store.save() {
            Ok(()) => self.send_to(from, ServerMessage::Saved { version }),
            Err(_) => self.reject(from, None, RejectReason::WriteFailure),
        }
    }

    fn reject(&mut self, to: ConnectionId, cell: Option<String>, reason: RejectReason) {
        self.send_to(to, ServerMessage::EditRejected { cell, reason });
    }

    fn send_to(&mut self, to: ConnectionId, message: ServerMessage) {
        let Some(peer) = self.peers.iter().find(|p| p.id == to) else {
            return;
        };

        if let Err(reason) = Self::deliver(peer, message) {
            self.remove_peer(to, reason);
        }
    }

    /// Fan out to every active connection except `except`. Sends never block;
    /// a connection whose queue is full or closed is dropped.
    fn broadcast(&mut self, except: Option<ConnectionId>, message: ServerMessage) {
        let mut failed = Vec::new();
        let mut delivered = 0;

        for peer in &self.peers {
            if Some(peer.id) == except || peer.state != ConnectionState::Active {
                continue;
            }
            match Self::deliver(peer, message.clone()) {
                Ok(()) => delivered += 1,
                Err(reason) => failed.push((peer.id, reason)),
            }
        }

        tracing::debug!("[{}] Broadcast to {} connections", self.name, delivered);
        for (id, reason) in failed {
            self.remove_peer(id, reason);
        }
    }

    fn deliver(peer: &Peer, message: ServerMessage) -> std::result::Result<(), &'static str> {
        match peer.outbox.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err("lagged"),
            Err(TrySendError::Closed(_)) => Err("disconnected"),
        }
    }

    fn remove_peer(&mut self, id: ConnectionId, reason: &str) {
        let Some(index) = self.peers.iter().position(|p| p.id == id) else {
            return;
        };

        let mut peer = self.peers.remove(index);
        peer.state = ConnectionState::Left;

        if reason == "lagged" {
            tracing::warn!(
                "[{}] Dropping {}: outbound queue full ({} connected)",
                self.name,
                id,
                self.peers.len()
            );
        } else {
            tracing::info!(
                "[{}] {} {} ({} connected)",
                self.name,
                id,
                reason,
                self.peers.len()
            );
        }
    }

    fn is_active(&self, id: ConnectionId) -> bool {
        self.peers
            .iter()
            .any(|p| p.id == id && p.state == ConnectionState::Active)
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            name: self.name.to_string(),
            connections: self.peers.len(),
            version: self.store.version(),
            cells: self.store.cell_count(),
            undo_depth: self.history.len(),
        }
    }

    fn final_save(&self) -> Result<()> {
        if self.store.is_loaded() {
            self.store.save()
        } else {
            Ok(())
        }
    }
}
