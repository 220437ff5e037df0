//! Note list use-cases.
//!
//! # Responsibility
//! - Build list-card projections (preview text, cover image).
//! - Delete and duplicate notes.
//!
//! # Invariants
//! - Summaries are ordered `timestamp DESC, id DESC`.
//! - A duplicate is always a new row stamped with the current time; its
//!   `image_uris` are derived from its content whenever the content decodes.

use crate::clock::Clock;
use crate::codec::block_codec::{self, DEFAULT_PREVIEW_CHARS};
use crate::model::note::{Note, NoteId, UNSAVED_NOTE_ID};
use crate::repo::note_repo::{NoteRepository, RepoError};
use log::info;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    /// Target note does not exist.
    NoteNotFound(NoteId),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::NoteNotFound(_) => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NoteNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// List-card projection of one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteSummary {
    pub id: NoteId,
    pub title: String,
    /// Empty when the note has no text; placeholder text is a UI concern.
    pub preview: String,
    pub timestamp: i64,
    pub cover_image: Option<String>,
}

/// What to copy when duplicating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateSource {
    /// A persisted note.
    Stored(NoteId),
    /// Unsaved editor state.
    Draft {
        title: String,
        content: String,
        drawing_overlay_data: Option<String>,
    },
}

/// Note service facade over repository implementations.
pub struct NoteService<R: NoteRepository, C: Clock> {
    repo: R,
    clock: C,
    preview_chars: usize,
}

impl<R: NoteRepository, C: Clock> NoteService<R, C> {
    pub fn new(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars.max(1);
        self
    }

    /// Lists every note as a summary, newest first.
    pub fn list_notes(&self) -> Result<Vec<NoteSummary>, NoteServiceError> {
        let notes = self.repo.list_all()?;
        Ok(notes
            .iter()
            .map(|note| summarize(note, self.preview_chars))
            .collect())
    }

    pub fn get_note(&self, id: NoteId) -> Result<Option<Note>, NoteServiceError> {
        Ok(self.repo.get_by_id(id)?)
    }

    /// Deletes one note.
    ///
    /// # Errors
    /// - `NoteNotFound` when no row has `id`.
    pub fn delete_note(&self, id: NoteId) -> Result<(), NoteServiceError> {
        self.repo.delete(id)?;
        info!("event=note_delete module=service status=ok note_id={}", id);
        Ok(())
    }

    /// Deletes every listed note and returns how many existed.
    pub fn delete_notes(&self, ids: &[NoteId]) -> Result<usize, NoteServiceError> {
        let deleted = self.repo.delete_by_ids(ids)?;
        info!(
            "event=note_delete_batch module=service status=ok requested={} deleted={}",
            ids.len(),
            deleted
        );
        Ok(deleted)
    }

    /// Creates a copy of a stored note or of unsaved editor state.
    ///
    /// Returns the inserted note with its new id.
    pub fn duplicate_note(&self, source: DuplicateSource) -> Result<Note, NoteServiceError> {
        let (title, content, drawing_overlay_data, fallback_uris, source_id) = match source {
            DuplicateSource::Stored(id) => {
                let original = self
                    .repo
                    .get_by_id(id)?
                    .ok_or(NoteServiceError::NoteNotFound(id))?;
                (
                    original.title,
                    original.content,
                    original.drawing_overlay_data,
                    original.image_uris,
                    id,
                )
            }
            DuplicateSource::Draft {
                title,
                content,
                drawing_overlay_data,
            } => (title, content, drawing_overlay_data, Vec::new(), UNSAVED_NOTE_ID),
        };

        let image_uris = match block_codec::decode(&content) {
            Ok(blocks) => block_codec::image_uris(&blocks),
            Err(_) => fallback_uris,
        };

        let mut copy = Note::new_unsaved(title, content, self.clock.now_ms());
        copy.drawing_overlay_data = drawing_overlay_data;
        copy.image_uris = image_uris;
        copy.id = self.repo.insert(&copy)?;

        info!(
            "event=note_duplicate module=service status=ok source_id={} note_id={}",
            source_id, copy.id
        );
        Ok(copy)
    }
}

/// Builds the list-card projection of one note.
pub fn summarize(note: &Note, preview_chars: usize) -> NoteSummary {
    NoteSummary {
        id: note.id,
        title: note.title.clone(),
        preview: block_codec::content_preview(&note.content, preview_chars),
        timestamp: note.timestamp,
        cover_image: block_codec::cover_image(&note.content),
    }
}

#[cfg(test)]
mod tests {
    use super::summarize;
    use crate::codec::block_codec::encode;
    use crate::model::block::ContentBlock;
    use crate::model::note::Note;

    #[test]
    fn summary_uses_block_text_and_first_image() {
        let content = encode(&[
            ContentBlock::text("  first line "),
            ContentBlock::image("file:///img/a.png"),
            ContentBlock::text("second"),
            ContentBlock::image("file:///img/b.png"),
        ])
        .unwrap();
        let mut note = Note::new_unsaved("Title", content, 5);
        note.id = 3;

        let summary = summarize(&note, 150);
        assert_eq!(summary.preview, "first line\nsecond");
        assert_eq!(summary.cover_image.as_deref(), Some("file:///img/a.png"));
        assert_eq!(summary.timestamp, 5);
    }

    #[test]
    fn summary_of_legacy_note_is_raw_and_truncated() {
        let note = Note::new_unsaved("t", "plain old text", 1);
        let summary = summarize(&note, 5);
        assert_eq!(summary.preview, "plain");
        assert_eq!(summary.cover_image, None);
    }
}
