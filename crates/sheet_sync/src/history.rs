//! Undo history

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A cell and the contents it held before an edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub cell: String,
    pub prior_contents: String,
}

/// LIFO record of edits that can be reversed.
///
/// Unbounded by default. With a limit, recording past it evicts the oldest
/// entry so the most recent edits always stay undoable.
#[derive(Debug, Default)]
pub struct UndoHistory {
    entries: VecDeque<UndoEntry>,
    limit: Option<usize>,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `0` means unbounded
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: (limit > 0).then_some(limit),
        }
    }

    /// Append an entry, returning whatever was evicted to make room
    pub fn record(
        &mut self,
        cell: impl Into<String>,
        prior_contents: impl Into<String>,
    ) -> Option<UndoEntry> {
        let evicted = match self.limit {
            Some(limit) if self.entries.len() >= limit => self.entries.pop_front(),
            _ => None,
        };

        self.entries.push_back(UndoEntry {
            cell: cell.into(),
            prior_contents: prior_contents.into(),
        });
        evicted
    }

    /// Pop the most recent entry
    pub fn undo(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    /// Reverse the last `record`, putting back the entry it evicted.
    /// Used when an edit could not be persisted.
    pub(crate) fn rollback_record(&mut self, evicted: Option<UndoEntry>) {
        self.entries.pop_back();
        if let Some(entry) = evicted {
            self.entries.push_front(entry);
        }
    }

    /// Reverse an `undo` whose restore could not be persisted
    pub(crate) fn restore(&mut self, entry: UndoEntry) {
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
