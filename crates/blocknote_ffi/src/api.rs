//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose note list, transfer and editor-session use-cases to Dart via FRB.
//! - Own editor sessions; the core never keeps global editor state.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every response carries `ok` plus a human-readable `message`.
//! - The session map lock is only held to look up or insert a session, never
//!   across repository or file I/O.
//! - Selection offsets crossing this boundary are UTF-16 code units (Dart
//!   `TextSelection`); the core works in char offsets.

use blocknote_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    ContentBlock, CoreConfig, DuplicateSource, EditorController, EditorOptions, ExportOptions,
    FsImageStore, LoadOutcome, NoteId, NoteService, NoteSummary, Notice, SqliteNoteRepository,
    SystemClock, TextFieldState, TextRange, TransferService,
};
use log::{info, warn};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type EditorSession = EditorController<SqliteNoteRepository, FsImageStore, SystemClock>;

static CORE_CONFIG: OnceCell<CoreConfig> = OnceCell::new();
static SESSIONS: Lazy<Mutex<HashMap<u64, Arc<Mutex<EditorSession>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Pins the app data directory (database, managed images, logs).
///
/// Without this call the core falls back to `BLOCKNOTE_*` environment
/// variables and then to a temp directory.
///
/// # FFI contract
/// - Idempotent for the same directory; a different directory is rejected.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_core(data_dir: String) -> String {
    let trimmed = data_dir.trim();
    if trimmed.is_empty() {
        return "data_dir cannot be empty".to_string();
    }
    let requested = CoreConfig::from_env()
        .map(|config| CoreConfig {
            data_dir: trimmed.into(),
            ..config
        })
        .unwrap_or_else(|_| CoreConfig::with_data_dir(trimmed));
    let active = CORE_CONFIG.get_or_init(|| requested.clone());
    if active.data_dir != requested.data_dir {
        return format!(
            "core already initialized at `{}`; refusing to switch to `{}`",
            active.data_dir.display(),
            requested.data_dir.display()
        );
    }
    String::new()
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Affected note id, when the action produced or saved one.
    pub note_id: Option<i64>,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, note_id: Option<NoteId>) -> Self {
        Self {
            ok: true,
            note_id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            note_id: None,
            message: message.into(),
        }
    }
}

/// One note list card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteListItem {
    pub id: i64,
    pub title: String,
    pub preview: String,
    pub timestamp: i64,
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotesListResponse {
    pub ok: bool,
    pub items: Vec<NoteListItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    pub ok: bool,
    pub json: String,
    pub exported: u32,
    pub skipped_images: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResponse {
    pub ok: bool,
    pub new_ids: Vec<i64>,
    /// `index: reason` per skipped entry.
    pub skipped_entries: Vec<String>,
    pub message: String,
}

/// Render model of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockView {
    pub id: String,
    /// `text` or `image`.
    pub kind: String,
    pub text: String,
    pub uri: Option<String>,
    /// UTF-16 code-unit offsets into `text`.
    pub selection_start: u32,
    pub selection_end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeView {
    pub is_error: bool,
    pub message: String,
}

/// Render model of an editor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorView {
    pub note_id: i64,
    pub title: String,
    pub title_selection_start: u32,
    pub title_selection_end: u32,
    pub blocks: Vec<BlockView>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub is_editing: bool,
    pub displayed_timestamp: i64,
    pub notices: Vec<NoticeView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorResponse {
    pub ok: bool,
    pub session_id: u64,
    pub state: Option<EditorView>,
    pub message: String,
}

impl EditorResponse {
    fn failure(session_id: u64, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            session_id,
            state: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResponse {
    pub ok: bool,
    pub text: String,
    pub message: String,
}

/// Lists notes newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn notes_list() -> NotesListResponse {
    match with_note_service(|service| service.list_notes().map_err(|err| err.to_string())) {
        Ok(summaries) => {
            let items = summaries
                .into_iter()
                .map(to_note_list_item)
                .collect::<Vec<_>>();
            NotesListResponse {
                ok: true,
                message: format!("Found {} note(s).", items.len()),
                items,
            }
        }
        Err(err) => NotesListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("notes_list failed: {err}"),
        },
    }
}

/// Deletes the listed notes.
#[flutter_rust_bridge::frb(sync)]
pub fn notes_delete(ids: Vec<i64>) -> ActionResponse {
    match with_note_service(|service| service.delete_notes(&ids).map_err(|err| err.to_string())) {
        Ok(deleted) => ActionResponse::success(format!("Deleted {deleted} note(s)."), None),
        Err(err) => ActionResponse::failure(format!("notes_delete failed: {err}")),
    }
}

/// Duplicates a stored note.
#[flutter_rust_bridge::frb(sync)]
pub fn note_duplicate(note_id: i64) -> ActionResponse {
    let result = with_note_service(|service| {
        service
            .duplicate_note(DuplicateSource::Stored(note_id))
            .map_err(|err| err.to_string())
    });
    match result {
        Ok(copy) => ActionResponse::success("Note duplicated.", Some(copy.id)),
        Err(err) => ActionResponse::failure(format!("note_duplicate failed: {err}")),
    }
}

/// Exports notes as a JSON document. Empty `ids` exports all notes.
#[flutter_rust_bridge::frb(sync)]
pub fn notes_export(ids: Vec<i64>, include_images: bool, include_drawings: bool) -> ExportResponse {
    let options = ExportOptions {
        include_images,
        include_drawings,
    };
    match with_transfer_service(|service| {
        service
            .export_notes(&ids, options)
            .map_err(|err| err.to_string())
    }) {
        Ok(report) => ExportResponse {
            ok: true,
            message: format!("Exported {} note(s).", report.exported),
            exported: u32::try_from(report.exported).unwrap_or(u32::MAX),
            json: report.json,
            skipped_images: report.skipped_images,
        },
        Err(err) => ExportResponse {
            ok: false,
            json: String::new(),
            exported: 0,
            skipped_images: Vec::new(),
            message: format!("notes_export failed: {err}"),
        },
    }
}

/// Imports a JSON export document as new notes.
#[flutter_rust_bridge::frb(sync)]
pub fn notes_import(json: String) -> ImportResponse {
    match with_transfer_service(|service| service.import_notes(&json).map_err(|err| err.to_string()))
    {
        Ok(report) => ImportResponse {
            ok: true,
            message: format!(
                "Imported {} note(s), skipped {}.",
                report.new_ids.len(),
                report.skipped_entries.len()
            ),
            new_ids: report.new_ids,
            skipped_entries: report
                .skipped_entries
                .into_iter()
                .map(|entry| format!("{}: {}", entry.index, entry.reason))
                .collect(),
        },
        Err(err) => ImportResponse {
            ok: false,
            new_ids: Vec::new(),
            skipped_entries: Vec::new(),
            message: format!("notes_import failed: {err}"),
        },
    }
}

/// Opens an editor session for `note_id`, or for a new note when `None`.
#[flutter_rust_bridge::frb(sync)]
pub fn editor_open(note_id: Option<i64>) -> EditorResponse {
    let config = active_config();
    let mut editor = match open_stores(&config) {
        Ok((repo, images)) => {
            EditorController::new(repo, images, SystemClock, EditorOptions::from(&config))
        }
        Err(err) => return EditorResponse::failure(0, format!("editor_open failed: {err}")),
    };

    let outcome = match note_id {
        Some(id) => editor.open_by_id(id),
        None => editor.open(None),
    };
    if outcome != LoadOutcome::Loaded {
        let reason = match outcome {
            LoadOutcome::NotFound => "note not found",
            _ => "note could not be loaded",
        };
        return EditorResponse::failure(0, format!("editor_open failed: {reason}"));
    }

    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
    let state = editor_view(&mut editor);
    lock_sessions().insert(session_id, Arc::new(Mutex::new(editor)));
    info!(
        "event=editor_session_open module=ffi status=ok session_id={} note_id={}",
        session_id, state.note_id
    );
    EditorResponse {
        ok: true,
        session_id,
        state: Some(state),
        message: "Editor opened.".to_string(),
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn editor_set_title(
    session_id: u64,
    text: String,
    selection_start: u32,
    selection_end: u32,
) -> EditorResponse {
    with_session(session_id, |editor| {
        editor.set_title(field_state(text, selection_start, selection_end));
        Ok(())
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn editor_edit_block(
    session_id: u64,
    block_id: String,
    text: String,
    selection_start: u32,
    selection_end: u32,
) -> EditorResponse {
    with_session(session_id, |editor| {
        if editor.edit_block(&block_id, field_state(text, selection_start, selection_end)) {
            Ok(())
        } else {
            Err(format!("unknown text block `{block_id}`"))
        }
    })
}

/// Copies picked images into managed storage and appends them.
#[flutter_rust_bridge::frb(sync)]
pub fn editor_insert_images(session_id: u64, sources: Vec<String>) -> EditorResponse {
    with_session(session_id, |editor| {
        editor.insert_images(&sources);
        Ok(())
    })
}

/// Drives the debounce; call periodically while the editor is visible.
#[flutter_rust_bridge::frb(sync)]
pub fn editor_tick(session_id: u64) -> EditorResponse {
    with_session(session_id, |editor| {
        editor.tick();
        Ok(())
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn editor_undo(session_id: u64) -> EditorResponse {
    with_session(session_id, |editor| {
        editor.undo();
        Ok(())
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn editor_redo(session_id: u64) -> EditorResponse {
    with_session(session_id, |editor| {
        editor.redo();
        Ok(())
    })
}

/// Plain-text rendering for the platform share sheet.
#[flutter_rust_bridge::frb(sync)]
pub fn editor_share_text(session_id: u64) -> TextResponse {
    match find_session(session_id) {
        Some(session) => {
            let editor = session.lock().unwrap_or_else(PoisonError::into_inner);
            TextResponse {
                ok: true,
                text: editor.share_text(),
                message: String::new(),
            }
        }
        None => TextResponse {
            ok: false,
            text: String::new(),
            message: format!("unknown editor session {session_id}"),
        },
    }
}

/// Duplicates the session's note (or its unsaved draft).
#[flutter_rust_bridge::frb(sync)]
pub fn editor_duplicate(session_id: u64) -> ActionResponse {
    let Some(session) = find_session(session_id) else {
        return ActionResponse::failure(format!("unknown editor session {session_id}"));
    };
    let source = {
        let editor = session.lock().unwrap_or_else(PoisonError::into_inner);
        editor.duplicate_source()
    };
    let source = match source {
        Ok(source) => source,
        Err(err) => return ActionResponse::failure(format!("editor_duplicate failed: {err}")),
    };
    match with_note_service(|service| service.duplicate_note(source).map_err(|err| err.to_string()))
    {
        Ok(copy) => ActionResponse::success("Note duplicated.", Some(copy.id)),
        Err(err) => ActionResponse::failure(format!("editor_duplicate failed: {err}")),
    }
}

/// Closes the session, saving when there is something worth keeping.
#[flutter_rust_bridge::frb(sync)]
pub fn editor_close(session_id: u64) -> ActionResponse {
    let Some(session) = lock_sessions().remove(&session_id) else {
        return ActionResponse::failure(format!("unknown editor session {session_id}"));
    };
    let mut editor = session.lock().unwrap_or_else(PoisonError::into_inner);
    let outcome = editor.close();
    info!(
        "event=editor_session_close module=ffi status=ok session_id={} outcome={:?}",
        session_id, outcome
    );
    match outcome {
        blocknote_core::CloseOutcome::Skipped => ActionResponse::success("Nothing to save.", None),
        blocknote_core::CloseOutcome::Saved(id) => ActionResponse::success("Note saved.", Some(id)),
        blocknote_core::CloseOutcome::Failed => {
            ActionResponse::failure("editor_close failed: note could not be saved")
        }
    }
}

fn active_config() -> CoreConfig {
    if let Some(config) = CORE_CONFIG.get() {
        return config.clone();
    }
    CoreConfig::from_env().unwrap_or_else(|err| {
        warn!(
            "event=config_load module=ffi status=fallback error={}",
            err
        );
        CoreConfig::default()
    })
}

fn open_stores(config: &CoreConfig) -> Result<(SqliteNoteRepository, FsImageStore), String> {
    let repo = SqliteNoteRepository::open(config.db_path())
        .map_err(|err| format!("note store open failed: {err}"))?;
    let images = FsImageStore::open(config.image_dir())
        .map_err(|err| format!("image store open failed: {err}"))?;
    Ok((repo, images))
}

fn with_note_service<T>(
    f: impl FnOnce(&NoteService<SqliteNoteRepository, SystemClock>) -> Result<T, String>,
) -> Result<T, String> {
    let config = active_config();
    let repo = SqliteNoteRepository::open(config.db_path())
        .map_err(|err| format!("note store open failed: {err}"))?;
    let service = NoteService::new(repo, SystemClock).with_preview_chars(config.preview_chars);
    f(&service)
}

fn with_transfer_service<T>(
    f: impl FnOnce(
        &TransferService<SqliteNoteRepository, FsImageStore, SystemClock>,
    ) -> Result<T, String>,
) -> Result<T, String> {
    let (repo, images) = open_stores(&active_config())?;
    f(&TransferService::new(repo, images, SystemClock))
}

fn lock_sessions() -> std::sync::MutexGuard<'static, HashMap<u64, Arc<Mutex<EditorSession>>>> {
    SESSIONS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find_session(session_id: u64) -> Option<Arc<Mutex<EditorSession>>> {
    lock_sessions().get(&session_id).cloned()
}

fn with_session(
    session_id: u64,
    f: impl FnOnce(&mut EditorSession) -> Result<(), String>,
) -> EditorResponse {
    let Some(session) = find_session(session_id) else {
        return EditorResponse::failure(session_id, format!("unknown editor session {session_id}"));
    };
    let mut editor = session.lock().unwrap_or_else(PoisonError::into_inner);
    let result = f(&mut editor);
    let state = editor_view(&mut editor);
    match result {
        Ok(()) => EditorResponse {
            ok: true,
            session_id,
            state: Some(state),
            message: String::new(),
        },
        Err(message) => EditorResponse {
            ok: false,
            session_id,
            state: Some(state),
            message,
        },
    }
}

fn field_state(text: String, selection_start: u32, selection_end: u32) -> TextFieldState {
    let selection = TextRange {
        start: utf16_to_char_offset(&text, selection_start),
        end: utf16_to_char_offset(&text, selection_end),
    };
    TextFieldState::new(text, selection)
}

/// Maps a UTF-16 offset to a char offset. An offset inside a surrogate pair
/// rounds up to the next char; offsets past the end clamp to the char count.
fn utf16_to_char_offset(text: &str, offset: u32) -> usize {
    let target = offset as usize;
    let mut units = 0;
    for (index, ch) in text.chars().enumerate() {
        if units >= target {
            return index;
        }
        units += ch.len_utf16();
    }
    text.chars().count()
}

fn char_to_utf16_offset(text: &str, offset: usize) -> u32 {
    to_u32(text.chars().take(offset).map(char::len_utf16).sum())
}

fn editor_view(editor: &mut EditorSession) -> EditorView {
    let session: &EditorSession = editor;
    let blocks = session
        .blocks()
        .iter()
        .map(|block| block_view(session, block))
        .collect();
    let title = session.title().clone();
    EditorView {
        note_id: editor.note_id(),
        title_selection_start: char_to_utf16_offset(&title.text, title.selection.start),
        title_selection_end: char_to_utf16_offset(&title.text, title.selection.end),
        title: title.text,
        blocks,
        can_undo: editor.can_undo(),
        can_redo: editor.can_redo(),
        is_editing: editor.is_editing(),
        displayed_timestamp: editor.displayed_timestamp(),
        notices: editor.take_notices().into_iter().map(notice_view).collect(),
    }
}

fn block_view(editor: &EditorSession, block: &ContentBlock) -> BlockView {
    match block {
        ContentBlock::Text { id, text } => {
            let state = editor
                .field_state(id)
                .unwrap_or_else(|| TextFieldState::caret_at_end(text.as_str()));
            BlockView {
                id: id.clone(),
                kind: "text".to_string(),
                text: text.clone(),
                uri: None,
                selection_start: char_to_utf16_offset(text, state.selection.start),
                selection_end: char_to_utf16_offset(text, state.selection.end),
            }
        }
        ContentBlock::Image { id, uri } => BlockView {
            id: id.clone(),
            kind: "image".to_string(),
            text: String::new(),
            uri: Some(uri.clone()),
            selection_start: 0,
            selection_end: 0,
        },
    }
}

fn notice_view(notice: Notice) -> NoticeView {
    NoticeView {
        is_error: notice.is_error(),
        message: notice.message,
    }
}

fn to_note_list_item(summary: NoteSummary) -> NoteListItem {
    NoteListItem {
        id: summary.id,
        title: summary.title,
        preview: summary.preview,
        timestamp: summary.timestamp,
        cover_image: summary.cover_image,
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
