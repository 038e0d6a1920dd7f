//! Configuration for sheet sessions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for sessions and the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory holding sheet files (default: .sheetsync/sheets)
    pub data_dir: PathBuf,

    /// Extension appended to sheet names (default: ss)
    pub file_extension: String,

    /// Messages buffered per connection before it is dropped as lagged
    pub outbox_capacity: usize,

    /// Commands buffered per session
    pub command_queue_capacity: usize,

    /// Undo entries kept per session, 0 for unbounded
    pub undo_limit: usize,

    /// Refuse edits made against an older version instead of last-writer-wins
    pub reject_stale_edits: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(sheet_common::DEFAULT_DATA_DIR),
            file_extension: sheet_common::DEFAULT_SHEET_EXTENSION.to_string(),
            outbox_capacity: 256,
            command_queue_capacity: 1024,
            undo_limit: 0,
            reject_stale_edits: false,
        }
    }
}

impl SyncConfig {
    /// Load config from TOML file
    pub fn from_toml(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir cannot be empty");
        }
        if self.file_extension.contains(['/', '\\', '.']) {
            anyhow::bail!("file_extension must be a bare extension without dots or separators");
        }
        if self.outbox_capacity == 0 {
            anyhow::bail!("outbox_capacity must be > 0");
        }
        if self.command_queue_capacity == 0 {
            anyhow::bail!("command_queue_capacity must be > 0");
        }
        Ok(())
    }
}
