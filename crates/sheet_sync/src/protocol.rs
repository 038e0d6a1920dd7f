//! Session message types

use crate::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages a client sends to its session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Set a cell's contents
    EditCell {
        cell: String,
        contents: String,
        /// Version the client last saw; only checked when stale edits are rejected
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_version: Option<u64>,
    },

    /// Reverse the most recent change to the sheet
    Undo,

    /// Ask for an explicit save
    Save,

    Ping,
}

/// Messages a session sends to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full sheet state, sent once on join
    Snapshot {
        version: u64,
        cells: BTreeMap<String, String>,
    },

    /// Someone changed a cell
    CellChanged {
        cell: String,
        contents: String,
        version: u64,
    },

    /// Your edit was applied and saved
    EditAccepted { cell: String, version: u64 },

    /// Your request was not applied
    EditRejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        cell: Option<String>,
        reason: RejectReason,
    },

    Saved { version: u64 },

    Pong,

    /// The inbound payload could not be understood
    Error { code: String, message: String },
}

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    NotLoaded,
    WriteFailure,
    StaleVersion { current: u64 },
    NothingToUndo,
    /// Cell names must be non-empty
    InvalidCell,
    /// The version counter cannot advance any further
    VersionExhausted,
}

impl ClientMessage {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize message from JSON bytes; undecodable input is `InvalidMessage`
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }
}

impl ServerMessage {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Version this message moves the client to, if any
    pub fn version(&self) -> Option<u64> {
        match self {
            ServerMessage::Snapshot { version, .. }
            | ServerMessage::CellChanged { version, .. }
            | ServerMessage::EditAccepted { version, .. }
            | ServerMessage::Saved { version } => Some(*version),
            _ => None,
        }
    }
}
