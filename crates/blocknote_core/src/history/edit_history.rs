//! Snapshot-per-meaningful-edit history engine.
//!
//! The engine is pure: it never persists anything. Callers react to
//! `RecordOutcome::Recorded` (the editor controller saves the note).

use crate::model::snapshot::EditorSnapshot;
use log::{debug, warn};

/// Result of offering a snapshot to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Snapshot differed from the current entry and was appended.
    Recorded,
    /// Snapshot was meaningfully equal to the current entry (or the history
    /// was not initialized yet).
    Skipped,
}

/// Vector + cursor undo/redo timeline.
#[derive(Debug, Default)]
pub struct EditHistory {
    entries: Vec<EditorSnapshot>,
    /// `None` before `initialize`.
    cursor: Option<usize>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the history with the load-time snapshot.
    ///
    /// Must be called exactly once per editor session. A second call is a
    /// caller bug: it asserts in debug builds and is ignored otherwise.
    pub fn initialize(&mut self, snapshot: EditorSnapshot) {
        debug_assert!(self.cursor.is_none(), "history initialized twice");
        if self.cursor.is_some() {
            warn!("event=history_init module=history status=ignored reason=already_initialized");
            return;
        }
        self.entries = vec![snapshot];
        self.cursor = Some(0);
    }

    pub fn is_initialized(&self) -> bool {
        self.cursor.is_some()
    }

    /// Appends `snapshot` unless it is meaningfully equal to the current entry.
    ///
    /// On append, every entry after the cursor (the redo branch) is dropped.
    pub fn record(&mut self, snapshot: EditorSnapshot) -> RecordOutcome {
        let Some(cursor) = self.cursor else {
            return RecordOutcome::Skipped;
        };
        if self.entries[cursor].meaningfully_eq(&snapshot) {
            debug!("event=history_record module=history status=skipped cursor={cursor}");
            return RecordOutcome::Skipped;
        }

        self.entries.truncate(cursor + 1);
        self.entries.push(snapshot);
        let new_cursor = self.entries.len() - 1;
        self.cursor = Some(new_cursor);
        debug!(
            "event=history_record module=history status=recorded cursor={} len={}",
            new_cursor,
            self.entries.len()
        );
        RecordOutcome::Recorded
    }

    /// Steps back one entry and returns it, or `None` at the initial entry.
    pub fn undo(&mut self) -> Option<&EditorSnapshot> {
        let cursor = self.cursor.filter(|cursor| *cursor > 0)? - 1;
        self.cursor = Some(cursor);
        self.entries.get(cursor)
    }

    /// Steps forward one entry and returns it, or `None` at the newest entry.
    pub fn redo(&mut self) -> Option<&EditorSnapshot> {
        let cursor = self.cursor.filter(|cursor| cursor + 1 < self.entries.len())? + 1;
        self.cursor = Some(cursor);
        self.entries.get(cursor)
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor + 1 < self.entries.len())
    }

    /// Dirty-since-load flag shown by the editor chrome.
    pub fn is_editing(&self) -> bool {
        self.can_undo()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at the cursor.
    pub fn current(&self) -> Option<&EditorSnapshot> {
        self.entries.get(self.cursor?)
    }

    /// Load-time entry.
    pub fn initial(&self) -> Option<&EditorSnapshot> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[EditorSnapshot] {
        &self.entries
    }
}
