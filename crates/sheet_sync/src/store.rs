//! Authoritative sheet state and its on-disk file

use crate::codec::{self, Header};
use crate::{Result, SyncError};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Cell map, version counter and password of one sheet.
///
/// A store starts unloaded and only becomes usable after [`load`] or
/// [`create`] succeeds. Authentication reads the password from the file,
/// not from memory, so it reflects the sheet as last persisted.
///
/// [`load`]: DocumentStore::load
/// [`create`]: DocumentStore::create
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    loaded: bool,
    password: String,
    version: u64,
    cells: BTreeMap<String, String>,
}

impl DocumentStore {
    /// Bind an unloaded store to a file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: false,
            password: String::new(),
            version: 0,
            cells: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Start a fresh sheet at version 0 and persist it immediately.
    ///
    /// Does not check whether the file already exists; callers that must not
    /// clobber a sheet check [`exists`](DocumentStore::exists) first.
    pub fn create(&mut self, password: &str) -> Result<()> {
        validate_password(password)?;

        let fresh = Self {
            path: self.path.clone(),
            loaded: true,
            password: password.to_string(),
            version: 0,
            cells: BTreeMap::new(),
        };
        let previous = std::mem::replace(self, fresh);

        if let Err(e) = self.save() {
            *self = previous;
            return Err(e);
        }

        tracing::info!("Created sheet {:?}", self.path);
        Ok(())
    }

    /// Replace in-memory state with the file contents
    pub fn load(&mut self) -> Result<()> {
        let content = fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SyncError::NotFound {
                path: self.path.clone(),
            },
            _ => SyncError::Io(e),
        })?;

        let decoded = codec::decode_bytes(&content).map_err(|e| self.malformed(e.to_string()))?;

        self.password = decoded.header.password;
        self.version = decoded.header.version;
        self.cells = decoded.cells;
        self.loaded = true;

        tracing::info!(
            "Loaded sheet {:?} at version {} ({} cells)",
            self.path,
            self.version,
            self.cells.len()
        );
        Ok(())
    }

    /// Atomically replace the file with the current state
    pub fn save(&self) -> Result<()> {
        if !self.loaded {
            return Err(SyncError::NotLoaded);
        }

        let encoded = codec::encode(&self.password, self.version, &self.cells);
        let tmp_path = self.tmp_path();

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(encoded.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };

        write().map_err(|source| {
            tracing::error!("Failed to save sheet {:?}: {}", self.path, source);
            let _ = fs::remove_file(&tmp_path);
            SyncError::WriteFailure {
                path: self.path.clone(),
                source,
            }
        })?;

        tracing::debug!("Saved sheet {:?} at version {}", self.path, self.version);
        Ok(())
    }

    /// Check a password against the header on disk
    pub fn authenticate(&self, candidate: &str) -> bool {
        match self.read_header() {
            Ok(header) => header.password == candidate,
            Err(e) => {
                tracing::debug!("Authentication against {:?} failed: {}", self.path, e);
                false
            }
        }
    }

    /// Read only the first line of the file
    pub fn read_header(&self) -> Result<Header> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SyncError::NotFound {
                path: self.path.clone(),
            },
            _ => SyncError::Io(e),
        })?;

        let mut line = String::new();
        BufReader::new(file)
            .read_line(&mut line)
            .map_err(|_| self.malformed("unreadable header"))?;

        codec::decode_header(&line).map_err(|e| self.malformed(e.to_string()))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Current version, or `None` while nothing is loaded
    pub fn version(&self) -> Option<u64> {
        self.loaded.then_some(self.version)
    }

    /// Contents of a cell; unknown cells are empty
    pub fn get_cell(&self, name: &str) -> String {
        self.cells.get(name).cloned().unwrap_or_default()
    }

    /// Unconditional upsert. Empty contents clear the cell.
    pub fn update_cell(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        let name = name.into();
        let contents = contents.into();
        if contents.is_empty() {
            self.cells.remove(&name);
        } else {
            self.cells.insert(name, contents);
        }
    }

    /// Advance the version counter (not persisted until the next save) and
    /// return the new version. Fails without changing anything at `u64::MAX`.
    pub fn increment_version(&mut self) -> Result<u64> {
        self.version = self
            .version
            .checked_add(1)
            .ok_or(SyncError::VersionExhausted)?;
        Ok(self.version)
    }

    /// Put the counter back to a version that was never published
    pub(crate) fn rewind_version(&mut self, version: u64) {
        debug_assert!(version <= self.version);
        self.version = version;
    }

    pub fn cells(&self) -> &BTreeMap<String, String> {
        &self.cells
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Version plus a copy of every cell, or `None` while nothing is loaded
    pub fn snapshot(&self) -> Option<(u64, BTreeMap<String, String>)> {
        self.version().map(|version| (version, self.cells.clone()))
    }

    /// In-memory password, for redacting it from logs
    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn malformed(&self, reason: impl Into<String>) -> SyncError {
        SyncError::Malformed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(SyncError::InvalidPassword("password cannot be empty".to_string()));
    }
    if password.chars().any(char::is_whitespace) {
        return Err(SyncError::InvalidPassword(
            "password cannot contain whitespace".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_create_then_load_round_trip() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("budget.ss");

        let mut store = DocumentStore::new(path.path());
        store.create("secret").unwrap();
        store.update_cell("A1", "42");
        store.increment_version().unwrap();
        store.save().unwrap();

        let mut fresh = DocumentStore::new(path.path());
        fresh.load().unwrap();
        assert_eq!(fresh.password(), "secret");
        assert_eq!(fresh.version(), Some(1));
        assert_eq!(fresh.get_cell("A1"), "42");
    }

    #[test]
    fn test_unloaded_store() {
        let store = DocumentStore::new("/nonexistent/sheet.ss");
        assert!(!store.is_loaded());
        assert_eq!(store.version(), None);
        assert!(store.snapshot().is_none());
        assert!(matches!(store.save(), Err(SyncError::NotLoaded)));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut store = DocumentStore::new(temp.child("missing.ss").path());

        assert!(matches!(store.load(), Err(SyncError::NotFound { .. })));
        assert!(!store.is_loaded());
    }

    #[test]
    fn test_load_malformed_header_leaves_store_unloaded() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("bad.ss");
        path.write_str("secret notanumber\nA1 1\n").unwrap();

        let mut store = DocumentStore::new(path.path());
        assert!(matches!(store.load(), Err(SyncError::Malformed { .. })));
        assert!(!store.is_loaded());
        assert_eq!(store.get_cell("A1"), "");
    }

    #[test]
    fn test_load_tolerates_invalid_utf8_in_cells() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("latin1.ss");
        path.write_binary(b"secret 3\nA1 42\nB1 caf\xE9\n").unwrap();

        let mut store = DocumentStore::new(path.path());
        store.load().unwrap();
        assert!(store.authenticate("secret"));
        assert_eq!(store.version(), Some(3));
        assert_eq!(store.get_cell("A1"), "42");
        assert_eq!(store.get_cell("B1"), "caf\u{FFFD}");
    }

    #[test]
    fn test_increment_version_at_max_fails_cleanly() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("full.ss");
        path.write_str(&format!("pw {}\n", u64::MAX)).unwrap();

        let mut store = DocumentStore::new(path.path());
        store.load().unwrap();
        assert!(matches!(
            store.increment_version(),
            Err(SyncError::VersionExhausted)
        ));
        assert_eq!(store.version(), Some(u64::MAX));
    }

    #[test]
    fn test_get_cell_unknown_is_empty() {
        let mut store = DocumentStore::new("unused.ss");
        assert_eq!(store.get_cell("Z99"), "");

        store.update_cell("Z99", "x");
        store.update_cell("Z99", "");
        assert_eq!(store.cell_count(), 0);
    }

    #[test]
    fn test_authenticate_reads_disk_not_memory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("auth.ss");

        let mut store = DocumentStore::new(path.path());
        store.create("original").unwrap();

        // Unsaved in-memory changes do not affect authentication.
        store.update_cell("A1", "unsaved");
        store.increment_version().unwrap();
        assert!(store.authenticate("original"));
        assert!(!store.authenticate("other"));
    }

    #[test]
    fn test_authenticate_missing_file_is_false() {
        let temp = assert_fs::TempDir::new().unwrap();
        let store = DocumentStore::new(temp.child("nope.ss").path());
        assert!(!store.authenticate("anything"));
    }

    #[test]
    fn test_create_rejects_bad_passwords() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("pw.ss");
        let mut store = DocumentStore::new(path.path());

        assert!(matches!(store.create(""), Err(SyncError::InvalidPassword(_))));
        assert!(matches!(
            store.create("two words"),
            Err(SyncError::InvalidPassword(_))
        ));
        assert!(!store.is_loaded());
        path.assert(predicates::path::missing());
    }

    #[test]
    fn test_create_write_failure_keeps_store_unloaded() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut store = DocumentStore::new(temp.child("no_such_dir/sheet.ss").path());

        assert!(matches!(
            store.create("secret"),
            Err(SyncError::WriteFailure { .. })
        ));
        assert!(!store.is_loaded());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("clean.ss");

        let mut store = DocumentStore::new(path.path());
        store.create("pw").unwrap();
        store.save().unwrap();

        temp.child("clean.ss.tmp").assert(predicates::path::missing());
        path.assert("pw 0\n");
    }
}
