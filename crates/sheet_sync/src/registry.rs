//! Named sheets and their running sessions

use crate::config::SyncConfig;
use crate::connection::Connection;
use crate::session::SessionHandle;
use crate::store::DocumentStore;
use crate::{Result, SyncError};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Opens sheets by name, one session per sheet.
///
/// The lock is held across opening a sheet so two clients racing to open the
/// same new sheet cannot end up with two sessions over one file.
#[derive(Debug)]
pub struct SessionRegistry {
    config: SyncConfig,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// File backing a sheet name
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self
            .config
            .data_dir
            .join(format!("{}.{}", name, self.config.file_extension)))
    }

    /// Join the named sheet, creating it with `password` if it does not exist
    pub async fn open(&self, name: &str, password: &str) -> Result<Connection> {
        let path = self.path_for(name)?;
        let mut sessions = self.sessions.lock().await;

        if let Some(handle) = sessions.get(name).filter(|h| !h.is_closed()) {
            if !handle.authenticate(password).await? {
                tracing::info!("Rejected password for sheet {}", name);
                return Err(SyncError::AuthFailure {
                    name: name.to_string(),
                });
            }
            return handle.join().await;
        }

        let mut store = DocumentStore::new(path);
        if store.exists() {
            store.load()?;
            if !store.authenticate(password) {
                tracing::info!("Rejected password for sheet {}", name);
                return Err(SyncError::AuthFailure {
                    name: name.to_string(),
                });
            }
        } else {
            store.create(password)?;
        }

        let handle = SessionHandle::spawn(name, store, &self.config);
        sessions.insert(name.to_string(), handle.clone());
        handle.join().await
    }

    /// Running session for a sheet, if any
    pub async fn session(&self, name: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .await
            .get(name)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|h| !h.is_closed())
            .count()
    }

    /// Shut down sessions nobody is connected to. Returns how many closed.
    pub async fn close_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let mut idle = Vec::new();

        for (name, handle) in sessions.iter() {
            match handle.stats().await {
                Ok(stats) if stats.connections == 0 => idle.push(name.clone()),
                Ok(_) => {}
                // Already stopped
                Err(_) => idle.push(name.clone()),
            }
        }

        for name in &idle {
            if let Some(handle) = sessions.remove(name) {
                if let Err(e) = handle.shutdown().await {
                    tracing::debug!("Session {} already closed: {}", name, e);
                }
            }
        }

        if !idle.is_empty() {
            tracing::info!("Closed {} idle session(s)", idle.len());
        }
        idle.len()
    }

    /// Save and stop every session
    pub async fn shutdown_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (name, handle) in sessions.drain() {
            if let Err(e) = handle.shutdown().await {
                tracing::warn!("Shutdown of session {} failed: {}", name, e);
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| -> Result<()> {
        Err(SyncError::InvalidDocumentName(format!("{:?}: {}", name, reason)))
    };

    if name.is_empty() {
        return invalid("empty");
    }
    if name == "." || name == ".." {
        return invalid("reserved");
    }
    if name.contains(['/', '\\', '\0']) {
        return invalid("contains a path separator");
    }
    if name.chars().any(char::is_control) {
        return invalid("contains control characters");
    }
    Ok(())
}
