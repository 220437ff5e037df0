//! Editor session orchestration.
//!
//! # Responsibility
//! - Own the live editor state (title, blocks, per-block field states).
//! - Coarsen keystrokes into history entries through a clock-driven debounce.
//! - Save to the repository after every recorded entry and on close.
//! - Insert batches of images as one history entry.
//!
//! # Invariants
//! - The load path runs at most once per controller.
//! - Live blocks are never empty and always end with a text block after load.
//! - A failed save leaves live state and history untouched.
//! - `image_uris` is recomputed from the live blocks on every save.
//! - Log lines carry ids and counts only, never note text.

use crate::clock::Clock;
use crate::codec::block_codec::{self, BlockCodecError};
use crate::config::{CoreConfig, DEFAULT_DEBOUNCE_MS};
use crate::history::edit_history::{EditHistory, RecordOutcome};
use crate::image::image_store::ImageStore;
use crate::model::block::{
    ensure_unique_ids, has_meaningful_blocks, persistable_blocks, BlockId, ContentBlock,
};
use crate::model::note::{Note, NoteId, UNSAVED_NOTE_ID};
use crate::model::snapshot::{EditorSnapshot, TextFieldState};
use crate::repo::note_repo::{NoteRepository, RepoError};
use crate::service::debounce::Debouncer;
use crate::service::note_service::DuplicateSource;
use crate::service::notice::Notice;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Controller tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorOptions {
    /// Quiet period before a change is recorded.
    pub debounce_ms: u64,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl From<&CoreConfig> for EditorOptions {
    fn from(config: &CoreConfig) -> Self {
        Self {
            debounce_ms: config.debounce_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The load path already ran; nothing changed.
    AlreadyLoaded,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Nothing due yet (or the due value was not distinct).
    Idle,
    /// History found the capture meaningfully equal to its current entry.
    Skipped,
    /// A new history entry was appended and a save attempted.
    Recorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(NoteId),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing worth persisting; no repository write happened.
    Skipped,
    Saved(NoteId),
    Failed,
}

/// Internal save failure, surfaced to callers as a notice.
#[derive(Debug)]
pub enum EditorError {
    Storage(RepoError),
    Codec(BlockCodecError),
}

impl Display for EditorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Codec(err) => write!(f, "codec error: {err}"),
        }
    }
}

impl Error for EditorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Codec(err) => Some(err),
        }
    }
}

impl From<RepoError> for EditorError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<BlockCodecError> for EditorError {
    fn from(value: BlockCodecError) -> Self {
        Self::Codec(value)
    }
}

/// One editor session over one note.
pub struct EditorController<R: NoteRepository, S: ImageStore, C: Clock> {
    repo: R,
    images: S,
    clock: C,
    history: EditHistory,
    debouncer: Debouncer<EditorSnapshot>,
    loaded: bool,
    title: TextFieldState,
    blocks: Vec<ContentBlock>,
    text_states: BTreeMap<BlockId, TextFieldState>,
    note_id: NoteId,
    drawing_overlay_data: Option<String>,
    loaded_timestamp: i64,
    displayed_timestamp: i64,
    saved_this_session: bool,
    notices: Vec<Notice>,
}

impl<R: NoteRepository, S: ImageStore, C: Clock> EditorController<R, S, C> {
    pub fn new(repo: R, images: S, clock: C, options: EditorOptions) -> Self {
        Self {
            repo,
            images,
            clock,
            history: EditHistory::new(),
            debouncer: Debouncer::new(options.debounce_ms, EditorSnapshot::meaningfully_eq),
            loaded: false,
            title: TextFieldState::default(),
            blocks: Vec::new(),
            text_states: BTreeMap::new(),
            note_id: UNSAVED_NOTE_ID,
            drawing_overlay_data: None,
            loaded_timestamp: 0,
            displayed_timestamp: 0,
            saved_this_session: false,
            notices: Vec::new(),
        }
    }

    /// Loads an existing note (`Some`) or starts a new one (`None`).
    ///
    /// Only the first call has an effect.
    pub fn open(&mut self, note: Option<Note>) -> LoadOutcome {
        if self.loaded {
            debug!(
                "event=editor_open module=editor status=skipped reason=already_loaded note_id={}",
                self.note_id
            );
            return LoadOutcome::AlreadyLoaded;
        }

        match note {
            Some(note) => {
                let mut blocks = block_codec::decode_or_legacy(&note.content);
                let reassigned = ensure_unique_ids(&mut blocks);
                if reassigned > 0 {
                    warn!(
                        "event=editor_open module=editor status=repaired note_id={} reassigned_ids={}",
                        note.id, reassigned
                    );
                }
                if !blocks.last().is_some_and(ContentBlock::is_text) {
                    blocks.push(ContentBlock::text(""));
                }
                self.title = TextFieldState::caret_at_end(note.title);
                self.blocks = blocks;
                self.note_id = note.id;
                self.drawing_overlay_data = note.drawing_overlay_data;
                self.loaded_timestamp = note.timestamp;
            }
            None => {
                self.title = TextFieldState::default();
                self.blocks = vec![ContentBlock::text("")];
                self.note_id = UNSAVED_NOTE_ID;
                self.drawing_overlay_data = None;
                self.loaded_timestamp = self.clock.now_ms();
            }
        }

        self.text_states = self
            .blocks
            .iter()
            .filter_map(|block| {
                let text = block.as_text()?;
                Some((block.id().to_string(), TextFieldState::caret_at_end(text)))
            })
            .collect();
        self.displayed_timestamp = self.loaded_timestamp;

        let snapshot = self.capture();
        self.history.initialize(snapshot.clone());
        self.debouncer.settle(snapshot);
        self.loaded = true;

        info!(
            "event=editor_open module=editor status=ok note_id={} blocks={}",
            self.note_id,
            self.blocks.len()
        );
        LoadOutcome::Loaded
    }

    /// Reads note `id` from the repository and loads it.
    pub fn open_by_id(&mut self, id: NoteId) -> LoadOutcome {
        if self.loaded {
            return LoadOutcome::AlreadyLoaded;
        }
        match self.repo.get_by_id(id) {
            Ok(note) => self.on_watch_emission(note),
            Err(err) => {
                error!(
                    "event=editor_open module=editor status=error note_id={} error={}",
                    id, err
                );
                self.notices.push(Notice::error("Could not load the note"));
                LoadOutcome::Failed
            }
        }
    }

    /// Handles one emission of a note watch.
    ///
    /// Emissions after the first load are ignored, so re-emissions caused by
    /// this controller's own saves never reload the editor.
    pub fn on_watch_emission(&mut self, emission: Option<Note>) -> LoadOutcome {
        if self.loaded {
            return LoadOutcome::AlreadyLoaded;
        }
        match emission {
            Some(note) => self.open(Some(note)),
            None => {
                warn!("event=editor_open module=editor status=not_found");
                self.notices.push(Notice::error("Note not found"));
                LoadOutcome::NotFound
            }
        }
    }

    pub fn set_title(&mut self, state: TextFieldState) {
        if !self.loaded {
            warn!("event=editor_edit module=editor status=ignored reason=not_loaded target=title");
            return;
        }
        self.title = TextFieldState::new(state.text, state.selection);
        self.mark_changed();
    }

    /// Applies a text field change to text block `id`.
    ///
    /// Returns `false` (and changes nothing) for unknown ids and image blocks.
    pub fn edit_block(&mut self, id: &str, state: TextFieldState) -> bool {
        let Some(index) = self
            .blocks
            .iter()
            .position(|block| block.id() == id && block.is_text())
        else {
            warn!(
                "event=editor_edit module=editor status=ignored reason=unknown_text_block note_id={}",
                self.note_id
            );
            return false;
        };

        let state = TextFieldState::new(state.text, state.selection);
        self.blocks[index] = self.blocks[index].with_text(state.text.clone());
        self.text_states.insert(id.to_string(), state);
        self.mark_changed();
        true
    }

    /// Records the pending change once the quiet period is over.
    pub fn tick(&mut self) -> CaptureOutcome {
        if !self.loaded {
            return CaptureOutcome::Idle;
        }
        let Some(snapshot) = self.debouncer.poll(self.clock.now_ms()) else {
            return CaptureOutcome::Idle;
        };
        match self.history.record(snapshot) {
            RecordOutcome::Recorded => {
                self.save();
                CaptureOutcome::Recorded
            }
            RecordOutcome::Skipped => CaptureOutcome::Skipped,
        }
    }

    /// Copies `sources` into managed storage and appends them as one edit.
    ///
    /// Copies run concurrently; every successful copy appends an image block
    /// followed by an empty text block. Returns how many images were added.
    pub fn insert_images(&mut self, sources: &[String]) -> usize {
        if !self.loaded || sources.is_empty() {
            return 0;
        }

        let started_at = Instant::now();
        let images = &self.images;
        let copied = std::thread::scope(|scope| {
            let handles = sources
                .iter()
                .map(|source| scope.spawn(move || images.copy_to_managed(source)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().ok().flatten())
                .collect::<Vec<_>>()
        });

        let uris = copied.into_iter().flatten().collect::<Vec<_>>();
        let failed = sources.len() - uris.len();
        info!(
            "event=image_insert module=editor status={} note_id={} requested={} added={} failed={} duration_ms={}",
            if failed == 0 { "ok" } else { "partial" },
            self.note_id,
            sources.len(),
            uris.len(),
            failed,
            started_at.elapsed().as_millis()
        );

        if uris.is_empty() {
            self.notices
                .push(Notice::error("Could not add the selected images"));
            return 0;
        }
        if failed > 0 {
            self.notices
                .push(Notice::error(format!("{failed} image(s) could not be added")));
        }

        let added = uris.len();
        for uri in uris {
            let spacer = ContentBlock::text("");
            self.text_states.insert(
                spacer.id().to_string(),
                TextFieldState::caret_at_end(""),
            );
            self.blocks.push(ContentBlock::image(uri));
            self.blocks.push(spacer);
        }

        let snapshot = self.capture();
        self.debouncer.settle(snapshot.clone());
        if self.history.record(snapshot) == RecordOutcome::Recorded {
            self.save();
        }
        self.notices
            .push(Notice::info(format!("Added {added} image(s)")));
        added
    }

    /// Steps history back and applies that entry to live state.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo().cloned() else {
            return false;
        };
        self.apply(snapshot);
        true
    }

    /// Steps history forward and applies that entry to live state.
    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo().cloned() else {
            return false;
        };
        self.apply(snapshot);
        true
    }

    /// Persists live state now.
    ///
    /// Trailing blank text blocks are not persisted. A new note adopts the
    /// id assigned by the store, so later saves update the same row.
    pub fn save(&mut self) -> SaveOutcome {
        if !self.loaded {
            return SaveOutcome::Failed;
        }
        let started_at = Instant::now();
        match self.write_note() {
            Ok(note_id) => {
                self.note_id = note_id;
                self.saved_this_session = true;
                info!(
                    "event=note_save module=editor status=ok note_id={} blocks={} duration_ms={}",
                    note_id,
                    self.blocks.len(),
                    started_at.elapsed().as_millis()
                );
                SaveOutcome::Saved(note_id)
            }
            Err(err) => {
                error!(
                    "event=note_save module=editor status=error note_id={} duration_ms={} error={}",
                    self.note_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                self.notices.push(Notice::error("Could not save the note"));
                SaveOutcome::Failed
            }
        }
    }

    /// Final save when the user leaves the editor.
    ///
    /// Skips the write for an untouched new note, and for an existing note
    /// that was only viewed.
    pub fn close(&mut self) -> CloseOutcome {
        if !self.loaded {
            return CloseOutcome::Skipped;
        }
        let skip = if self.note_id == UNSAVED_NOTE_ID {
            !self.has_meaningful_content()
        } else {
            !self.saved_this_session && self.matches_initial()
        };
        if skip {
            debug!(
                "event=editor_close module=editor status=skipped note_id={}",
                self.note_id
            );
            return CloseOutcome::Skipped;
        }
        match self.save() {
            SaveOutcome::Saved(id) => CloseOutcome::Saved(id),
            SaveOutcome::Failed => CloseOutcome::Failed,
        }
    }

    pub fn title(&self) -> &TextFieldState {
        &self.title
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// Live field state of text block `id`, reconciled against the block.
    ///
    /// Falls back to a caret-at-end state when the map has no entry or a
    /// stale one. `None` for unknown ids and image blocks.
    pub fn field_state(&self, id: &str) -> Option<TextFieldState> {
        let text = self
            .blocks
            .iter()
            .find(|block| block.id() == id)?
            .as_text()?;
        Some(
            self.text_states
                .get(id)
                .filter(|state| state.text == text)
                .cloned()
                .unwrap_or_else(|| TextFieldState::caret_at_end(text)),
        )
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_editing(&self) -> bool {
        self.history.is_editing()
    }

    /// "Last modified" time shown in the editor chrome.
    pub fn displayed_timestamp(&self) -> i64 {
        self.displayed_timestamp
    }

    pub fn note_id(&self) -> NoteId {
        self.note_id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    /// Returns and clears queued notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn share_text(&self) -> String {
        block_codec::share_text(&self.title.text, &self.blocks)
    }

    /// Non-blank title, any non-blank text block, or any image.
    pub fn has_meaningful_content(&self) -> bool {
        !self.title.text.trim().is_empty() || has_meaningful_blocks(&self.blocks)
    }

    /// Source for duplicating this session's note.
    ///
    /// Saved notes duplicate the stored row; new notes duplicate the live
    /// draft.
    pub fn duplicate_source(&self) -> Result<DuplicateSource, BlockCodecError> {
        if self.note_id != UNSAVED_NOTE_ID {
            return Ok(DuplicateSource::Stored(self.note_id));
        }
        Ok(DuplicateSource::Draft {
            title: self.title.text.clone(),
            content: block_codec::encode(&persistable_blocks(&self.blocks))?,
            drawing_overlay_data: self.drawing_overlay_data.clone(),
        })
    }

    fn capture(&self) -> EditorSnapshot {
        EditorSnapshot::capture(self.title.clone(), self.blocks.clone(), &self.text_states)
    }

    fn mark_changed(&mut self) {
        let snapshot = self.capture();
        self.debouncer.push(snapshot, self.clock.now_ms());
    }

    fn apply(&mut self, snapshot: EditorSnapshot) {
        self.debouncer.settle(snapshot.clone());
        self.title = snapshot.title;
        self.blocks = snapshot.blocks;
        self.text_states = snapshot.text_states;
        if self.history.cursor() == Some(0) {
            self.displayed_timestamp = self.loaded_timestamp;
        }
        debug!(
            "event=history_apply module=editor status=ok note_id={} cursor={:?}",
            self.note_id,
            self.history.cursor()
        );
    }

    fn matches_initial(&self) -> bool {
        self.history
            .initial()
            .is_some_and(|initial| initial.meaningfully_eq(&self.capture()))
    }

    fn write_note(&mut self) -> Result<NoteId, EditorError> {
        let content = block_codec::encode(&persistable_blocks(&self.blocks))?;
        let now = self.clock.now_ms();
        let note = Note {
            id: self.note_id,
            title: self.title.text.clone(),
            content,
            timestamp: now,
            drawing_overlay_data: self.drawing_overlay_data.clone(),
            image_uris: block_codec::image_uris(&self.blocks),
        };
        let id = self.repo.upsert(&note)?;
        self.displayed_timestamp = now;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::open_db_in_memory;
    use crate::image::image_store::ImageIoError;
    use crate::repo::note_repo::SqliteNoteRepository;

    struct NoImages;

    impl ImageStore for NoImages {
        fn copy_to_managed(&self, _source: &str) -> Option<String> {
            None
        }

        fn read(&self, uri: &str) -> Result<Vec<u8>, ImageIoError> {
            Err(ImageIoError::InvalidUri(uri.to_string()))
        }

        fn write_new(&self, filename_hint: &str, _bytes: &[u8]) -> Result<String, ImageIoError> {
            Err(ImageIoError::InvalidUri(filename_hint.to_string()))
        }
    }

    fn controller(
        clock: &ManualClock,
    ) -> EditorController<SqliteNoteRepository, NoImages, ManualClock> {
        let repo = SqliteNoteRepository::try_new(open_db_in_memory().unwrap()).unwrap();
        EditorController::new(repo, NoImages, clock.clone(), EditorOptions::default())
    }

    #[test]
    fn edits_before_load_are_ignored() {
        let clock = ManualClock::new(0);
        let mut editor = controller(&clock);
        editor.set_title(TextFieldState::caret_at_end("x"));
        assert_eq!(editor.title().text, "");
        assert_eq!(editor.tick(), CaptureOutcome::Idle);
        assert_eq!(editor.close(), CloseOutcome::Skipped);
    }

    #[test]
    fn edit_block_rejects_unknown_ids() {
        let clock = ManualClock::new(0);
        let mut editor = controller(&clock);
        editor.open(None);
        assert!(!editor.edit_block("missing", TextFieldState::caret_at_end("x")));
        assert_eq!(editor.blocks().len(), 1);
    }

    #[test]
    fn field_state_falls_back_to_caret_at_end() {
        let clock = ManualClock::new(0);
        let mut editor = controller(&clock);
        editor.open(Some(Note::new_unsaved("t", "legacy body", 1)));
        let id = editor.blocks()[0].id().to_string();
        let state = editor.field_state(&id).unwrap();
        assert_eq!(state, TextFieldState::caret_at_end("legacy body"));
        assert!(editor.field_state("missing").is_none());
    }

    #[test]
    fn all_failed_image_insert_adds_nothing() {
        let clock = ManualClock::new(0);
        let mut editor = controller(&clock);
        editor.open(None);
        let added = editor.insert_images(&["/a.png".to_string(), "/b.png".to_string()]);
        assert_eq!(added, 0);
        assert_eq!(editor.history().len(), 1);
        assert_eq!(editor.blocks().len(), 1);
        let notices = editor.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].is_error());
    }
}
