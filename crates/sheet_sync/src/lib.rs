//! # SheetSync Session Engine
//!
//! Server-side synchronization core for a shared, password-protected
//! spreadsheet.
//!
//! ## Architecture
//!
//! - **Store**: the authoritative cell map, version counter and password,
//!   persisted in a line-oriented escaped text format
//! - **History**: LIFO undo entries recorded before each edit
//! - **Session**: a single worker task per document that serializes edits,
//!   saves after every accepted change and fans deltas out to connections
//! - **Registry**: opens or creates sheet files by name and checks the shared
//!   password before handing out a connection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sheet_sync::{ClientMessage, SessionRegistry, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> sheet_sync::Result<()> {
//!     let registry = SessionRegistry::new(SyncConfig::default())?;
//!     let mut conn = registry.open("budget", "secret").await?;
//!
//!     // First message is always the full snapshot.
//!     let snapshot = conn.recv().await;
//!     println!("{:?}", snapshot);
//!
//!     conn.send(ClientMessage::EditCell {
//!         cell: "A1".to_string(),
//!         contents: "42".to_string(),
//!         base_version: None,
//!     })
//!     .await?;
//!
//!     registry.shutdown_all().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;

pub use config::SyncConfig;
pub use connection::{Connection, ConnectionId};
pub use history::{UndoEntry, UndoHistory};
pub use protocol::{ClientMessage, RejectReason, ServerMessage};
pub use registry::SessionRegistry;
pub use session::{SessionHandle, SessionStats};
pub use store::DocumentStore;

use std::path::PathBuf;

/// Common result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during sync operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Sheet file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Malformed sheet file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to write sheet file {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Authentication failed for {name}")]
    AuthFailure { name: String },

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("No sheet is loaded")]
    NotLoaded,

    #[error("Version counter exhausted")]
    VersionExhausted,

    #[error("Invalid document name: {0}")]
    InvalidDocumentName(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] anyhow::Error),
}
