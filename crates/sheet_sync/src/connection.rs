//! Transport-facing end of a session connection

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::SessionHandle;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity, assigned in join order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection as seen by its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Joining,
    Active,
    Left,
}

/// A joined client.
///
/// The transport reads outbound messages with [`recv`](Connection::recv) and
/// forwards inbound ones with [`send`](Connection::send). `recv` returning
/// `None` means the session dropped this connection (it left, lagged, or the
/// session shut down). Dropping a `Connection` leaves the session.
pub struct Connection {
    id: ConnectionId,
    outbox: mpsc::Receiver<ServerMessage>,
    session: SessionHandle,
    state: ConnectionState,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        outbox: mpsc::Receiver<ServerMessage>,
        session: SessionHandle,
    ) -> Self {
        Self {
            id,
            outbox,
            session,
            state: ConnectionState::Active,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Next message from the session
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        let msg = self.outbox.recv().await;
        if msg.is_none() {
            self.state = ConnectionState::Left;
        }
        msg
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        match self.outbox.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.state = ConnectionState::Left;
                None
            }
        }
    }

    /// Forward a client message to the session
    pub async fn send(&self, message: ClientMessage) -> crate::Result<()> {
        self.session.submit(self.id, message).await
    }

    /// Forward an undecoded payload; decode errors are reported back to this
    /// connection as `ServerMessage::Error`
    pub async fn send_bytes(&self, bytes: impl Into<Vec<u8>>) -> crate::Result<()> {
        self.session.submit_bytes(self.id, bytes.into()).await
    }

    /// Leave the session and wait until it has processed the departure
    pub async fn leave(mut self) -> crate::Result<()> {
        self.state = ConnectionState::Left;
        self.session.leave(self.id).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Left {
            self.session.try_leave(self.id);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("session", &self.session.name())
            .field("state", &self.state)
            .finish()
    }
}
