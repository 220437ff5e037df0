//! Persisted note record.
//!
//! # Invariants
//! - `id == UNSAVED_NOTE_ID` means the note has never been written.
//! - `image_uris` mirrors the image blocks of `content` at save time; writers
//!   recompute it from blocks instead of editing it independently.

use serde::{Deserialize, Serialize};

/// Store-assigned note identifier.
pub type NoteId = i64;

/// Sentinel id for a note that has not been persisted yet.
pub const UNSAVED_NOTE_ID: NoteId = 0;

/// One row of the `notes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    /// Codec-encoded block array, or plain text for notes written before blocks.
    pub content: String,
    /// Last-modified time in epoch milliseconds.
    pub timestamp: i64,
    /// Opaque drawing payload; carried through but never interpreted.
    pub drawing_overlay_data: Option<String>,
    /// Derived from `content`; ordered like the image blocks.
    pub image_uris: Vec<String>,
}

impl Note {
    /// Creates an unsaved note.
    pub fn new_unsaved(title: impl Into<String>, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: UNSAVED_NOTE_ID,
            title: title.into(),
            content: content.into(),
            timestamp,
            drawing_overlay_data: None,
            image_uris: Vec::new(),
        }
    }

    /// Returns whether the note still carries the unsaved sentinel id.
    pub fn is_new(&self) -> bool {
        self.id == UNSAVED_NOTE_ID
    }
}
