use blocknote_core::codec::block_codec::decode;
use blocknote_core::db::open_db_in_memory;
use blocknote_core::model::snapshot::TextRange;
use blocknote_core::{
    CaptureOutcome, CloseOutcome, ContentBlock, EditorController, EditorOptions, ImageIoError,
    ImageStore, LoadOutcome, ManualClock, Note, NoteId, NoteRepository, NoteWatch, RepoError,
    RepoResult, SaveOutcome, SqliteNoteRepository, TextFieldState, UNSAVED_NOTE_ID,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const START_MS: i64 = 1_000_000;

/// Repository wrapper that counts writes and can be told to fail them.
struct FlakyRepo {
    inner: SqliteNoteRepository,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyRepo {
    fn new() -> Self {
        Self {
            inner: SqliteNoteRepository::try_new(open_db_in_memory().unwrap()).unwrap(),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn guard(&self) -> RepoResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::InvalidData("disk full".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl NoteRepository for FlakyRepo {
    fn get_by_id(&self, id: NoteId) -> RepoResult<Option<Note>> {
        self.inner.get_by_id(id)
    }

    fn watch(&self, id: NoteId) -> RepoResult<NoteWatch> {
        self.inner.watch(id)
    }

    fn list_all(&self) -> RepoResult<Vec<Note>> {
        self.inner.list_all()
    }

    fn insert(&self, note: &Note) -> RepoResult<NoteId> {
        self.guard()?;
        self.inner.insert(note)
    }

    fn update(&self, note: &Note) -> RepoResult<()> {
        self.guard()?;
        self.inner.update(note)
    }

    fn upsert(&self, note: &Note) -> RepoResult<NoteId> {
        self.guard()?;
        self.inner.upsert(note)
    }

    fn delete(&self, id: NoteId) -> RepoResult<()> {
        self.guard()?;
        self.inner.delete(id)
    }

    fn delete_by_ids(&self, ids: &[NoteId]) -> RepoResult<usize> {
        self.guard()?;
        self.inner.delete_by_ids(ids)
    }
}

/// Copies succeed for `ok:<name>` sources and fail for anything else.
struct FakeImages;

impl ImageStore for FakeImages {
    fn copy_to_managed(&self, source: &str) -> Option<String> {
        source
            .strip_prefix("ok:")
            .map(|name| format!("file:///managed/{name}"))
    }

    fn read(&self, uri: &str) -> Result<Vec<u8>, ImageIoError> {
        Err(ImageIoError::InvalidUri(uri.to_string()))
    }

    fn write_new(&self, filename_hint: &str, _bytes: &[u8]) -> Result<String, ImageIoError> {
        Err(ImageIoError::InvalidUri(filename_hint.to_string()))
    }
}

type Editor<'a> = EditorController<&'a FlakyRepo, FakeImages, ManualClock>;

fn editor<'a>(repo: &'a FlakyRepo, clock: &ManualClock) -> Editor<'a> {
    EditorController::new(repo, FakeImages, clock.clone(), EditorOptions::default())
}

fn first_text_id(editor: &Editor<'_>) -> String {
    editor
        .blocks()
        .iter()
        .find(|block| block.is_text())
        .map(|block| block.id().to_string())
        .unwrap()
}

fn type_text(editor: &mut Editor<'_>, clock: &ManualClock, id: &str, base: &str, typed: &str) {
    let mut text = base.to_string();
    for ch in typed.chars() {
        text.push(ch);
        assert!(editor.edit_block(id, TextFieldState::caret_at_end(text.clone())));
        clock.advance(100);
        assert_eq!(editor.tick(), CaptureOutcome::Idle);
    }
}

fn stored_note(repo: &FlakyRepo, id: NoteId) -> Note {
    repo.get_by_id(id).unwrap().unwrap()
}

#[test]
fn typing_with_pauses_records_once_per_pause() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    assert_eq!(editor.open(None), LoadOutcome::Loaded);
    let id = first_text_id(&editor);

    type_text(&mut editor, &clock, &id, "", "Hello");
    clock.advance(1_000);
    assert_eq!(editor.tick(), CaptureOutcome::Recorded);
    assert_eq!(editor.tick(), CaptureOutcome::Idle);

    type_text(&mut editor, &clock, &id, "Hello", " world");
    clock.advance(1_000);
    assert_eq!(editor.tick(), CaptureOutcome::Recorded);

    assert_eq!(editor.history().len(), 3);
    assert_eq!(editor.history().cursor(), Some(2));
    assert!(editor.is_editing());

    let stored = stored_note(&repo, editor.note_id());
    let blocks = decode(&stored.content).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].as_text(), Some("Hello world"));
    assert_eq!(repo.writes(), 2);
}

#[test]
fn whitespace_only_changes_do_not_record() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    let id = first_text_id(&editor);

    editor.edit_block(&id, TextFieldState::caret_at_end("   "));
    clock.advance(1_500);
    assert_eq!(editor.tick(), CaptureOutcome::Idle);
    assert_eq!(editor.history().len(), 1);
    assert_eq!(repo.writes(), 0);
}

#[test]
fn new_note_adopts_store_id_across_saves() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    assert_eq!(editor.note_id(), UNSAVED_NOTE_ID);

    editor.set_title(TextFieldState::caret_at_end("Groceries"));
    clock.advance(1_000);
    assert_eq!(editor.tick(), CaptureOutcome::Recorded);
    let id = editor.note_id();
    assert_ne!(id, UNSAVED_NOTE_ID);

    editor.set_title(TextFieldState::caret_at_end("Groceries list"));
    clock.advance(1_000);
    editor.tick();
    assert_eq!(editor.note_id(), id);
    assert_eq!(editor.close(), CloseOutcome::Saved(id));

    let all = repo.list_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "Groceries list");
}

#[test]
fn untouched_new_note_leaves_no_trace() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    let id = first_text_id(&editor);
    editor.edit_block(&id, TextFieldState::caret_at_end("  \n "));
    editor.set_title(TextFieldState::caret_at_end("   "));

    assert!(!editor.has_meaningful_content());
    assert_eq!(editor.close(), CloseOutcome::Skipped);
    assert_eq!(repo.writes(), 0);
    assert!(repo.list_all().unwrap().is_empty());
}

#[test]
fn new_note_with_only_a_title_persists_one_empty_block() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    editor.set_title(TextFieldState::caret_at_end("Title only"));

    let CloseOutcome::Saved(id) = editor.close() else {
        panic!("expected a save");
    };
    let stored = stored_note(&repo, id);
    let blocks = decode(&stored.content).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].as_text(), Some(""));
    assert!(stored.image_uris.is_empty());
    assert_eq!(stored.timestamp, START_MS);
}

#[test]
fn save_trims_trailing_blank_blocks_but_keeps_image_uris() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    let id = first_text_id(&editor);
    editor.edit_block(&id, TextFieldState::caret_at_end("caption"));
    editor.insert_images(&["ok:a.png".to_string()]);

    let stored = stored_note(&repo, editor.note_id());
    let blocks = decode(&stored.content).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].as_text(), Some("caption"));
    assert_eq!(blocks[1].as_image_uri(), Some("file:///managed/a.png"));
    assert_eq!(stored.image_uris, vec!["file:///managed/a.png".to_string()]);
}

#[test]
fn image_batch_is_one_history_entry() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    let before = editor.blocks().to_vec();

    let sources = ["ok:u1.png", "ok:u2.png", "ok:u3.png"].map(String::from);
    assert_eq!(editor.insert_images(&sources), 3);
    assert_eq!(editor.history().len(), 2);
    assert_eq!(repo.writes(), 1);

    let added = &editor.blocks()[before.len()..];
    assert_eq!(added.len(), 6);
    for (pair, name) in added.chunks(2).zip(["u1.png", "u2.png", "u3.png"]) {
        assert_eq!(
            pair[0].as_image_uri(),
            Some(format!("file:///managed/{name}").as_str())
        );
        assert_eq!(pair[1].as_text(), Some(""));
    }

    let notices = editor.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].message, "Added 3 image(s)");
    assert!(editor.take_notices().is_empty());

    // The pending debounce was settled; no second entry appears later.
    clock.advance(5_000);
    assert_eq!(editor.tick(), CaptureOutcome::Idle);
    assert_eq!(editor.history().len(), 2);
}

#[test]
fn partial_image_failure_inserts_the_rest() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);

    let sources = ["ok:a.png", "broken", "ok:b.png"].map(String::from);
    assert_eq!(editor.insert_images(&sources), 2);
    assert_eq!(editor.history().len(), 2);

    let uris = editor
        .blocks()
        .iter()
        .filter_map(ContentBlock::as_image_uri)
        .collect::<Vec<_>>();
    assert_eq!(uris, vec!["file:///managed/a.png", "file:///managed/b.png"]);

    let notices = editor.take_notices();
    assert_eq!(notices.len(), 2);
    assert!(notices[0].is_error());
    assert!(!notices[1].is_error());
}

#[test]
fn undo_restores_load_timestamp_and_caret() {
    let repo = FlakyRepo::new();
    let mut existing = Note::new_unsaved("Old title", "[]", 500);
    existing.id = repo.inner.insert(&existing).unwrap();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);

    assert_eq!(editor.open_by_id(existing.id), LoadOutcome::Loaded);
    assert_eq!(editor.displayed_timestamp(), 500);
    assert_eq!(editor.blocks().len(), 1);
    let id = first_text_id(&editor);

    let typed = TextFieldState::new("draft text", TextRange { start: 0, end: 5 });
    editor.edit_block(&id, typed.clone());
    clock.advance(1_000);
    assert_eq!(editor.tick(), CaptureOutcome::Recorded);
    assert_eq!(editor.displayed_timestamp(), START_MS + 1_000);

    assert!(editor.undo());
    assert_eq!(editor.displayed_timestamp(), 500);
    assert_eq!(editor.blocks()[0].as_text(), Some(""));
    assert!(!editor.can_undo());
    assert!(editor.can_redo());
    assert!(!editor.undo());

    assert!(editor.redo());
    assert_eq!(editor.field_state(&id), Some(typed));
    assert!(!editor.can_redo());

    // Applying history does not create entries.
    clock.advance(5_000);
    assert_eq!(editor.tick(), CaptureOutcome::Idle);
    assert_eq!(editor.history().len(), 2);
}

#[test]
fn retyping_the_undone_text_records_and_drops_redo() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    let id = first_text_id(&editor);

    editor.edit_block(&id, TextFieldState::caret_at_end("abc"));
    clock.advance(1_000);
    editor.tick();
    assert!(editor.undo());

    editor.edit_block(&id, TextFieldState::caret_at_end("abc"));
    clock.advance(1_000);
    assert_eq!(editor.tick(), CaptureOutcome::Recorded);
    assert_eq!(editor.history().len(), 2);
    assert!(!editor.can_redo());
}

#[test]
fn storage_failure_keeps_state_and_queues_notice() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    let id = first_text_id(&editor);

    repo.set_failing(true);
    editor.edit_block(&id, TextFieldState::caret_at_end("keep me"));
    clock.advance(1_000);
    assert_eq!(editor.tick(), CaptureOutcome::Recorded);
    assert_eq!(editor.history().len(), 2);
    assert_eq!(editor.blocks()[0].as_text(), Some("keep me"));
    assert_eq!(editor.note_id(), UNSAVED_NOTE_ID);

    let notices = editor.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].is_error());
    assert_eq!(editor.save(), SaveOutcome::Failed);

    repo.set_failing(false);
    let CloseOutcome::Saved(saved_id) = editor.close() else {
        panic!("expected a save once storage recovers");
    };
    let stored = stored_note(&repo, saved_id);
    assert_eq!(decode(&stored.content).unwrap()[0].as_text(), Some("keep me"));
}

#[test]
fn watch_re_emissions_load_only_once() {
    let repo = FlakyRepo::new();
    let id = repo
        .inner
        .insert(&Note::new_unsaved("Watched", "[]", 5))
        .unwrap();
    let watch = repo.watch(id).unwrap();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);

    assert_eq!(
        editor.on_watch_emission(watch.try_next().unwrap()),
        LoadOutcome::Loaded
    );
    let block_id = first_text_id(&editor);
    editor.edit_block(&block_id, TextFieldState::caret_at_end("edited"));
    clock.advance(1_000);
    assert_eq!(editor.tick(), CaptureOutcome::Recorded);

    let emission = watch.try_next().unwrap();
    assert_eq!(editor.on_watch_emission(emission), LoadOutcome::AlreadyLoaded);
    assert_eq!(editor.open(None), LoadOutcome::AlreadyLoaded);
    assert_eq!(editor.history().len(), 2);
    assert_eq!(editor.blocks()[0].as_text(), Some("edited"));
}

#[test]
fn missing_note_reports_not_found() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    assert_eq!(editor.open_by_id(404), LoadOutcome::NotFound);
    assert!(!editor.is_loaded());
    assert_eq!(editor.take_notices().len(), 1);
}

#[test]
fn legacy_note_loads_as_single_block_and_viewing_does_not_save() {
    let repo = FlakyRepo::new();
    let id = repo
        .inner
        .insert(&Note::new_unsaved("Legacy", "written before blocks", 77))
        .unwrap();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);

    editor.open_by_id(id);
    assert_eq!(editor.blocks().len(), 1);
    assert_eq!(editor.blocks()[0].as_text(), Some("written before blocks"));

    clock.advance(10_000);
    assert_eq!(editor.tick(), CaptureOutcome::Idle);
    assert_eq!(editor.close(), CloseOutcome::Skipped);
    assert_eq!(repo.writes(), 0);
    assert_eq!(stored_note(&repo, id).timestamp, 77);
}

#[test]
fn note_ending_in_image_gets_a_caret_block() {
    let repo = FlakyRepo::new();
    let content = r#"[{"type":"image","id":"img","uri":"file:///x.png"},{"type":"text","id":"img","text":"dup"}]"#;
    let mut note = Note::new_unsaved("t", content, 1);
    note.id = 9;
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);

    editor.open(Some(note));
    let blocks = editor.blocks();
    assert_eq!(blocks.len(), 2);
    assert_ne!(blocks[0].id(), blocks[1].id(), "duplicate ids are repaired");
    assert!(blocks[1].is_text());

    let mut image_last = Note::new_unsaved(
        "t",
        r#"[{"type":"image","id":"i","uri":"file:///y.png"}]"#,
        1,
    );
    image_last.id = 10;
    let mut second = EditorController::new(
        &repo,
        FakeImages,
        clock.clone(),
        EditorOptions { debounce_ms: 10 },
    );
    second.open(Some(image_last));
    assert_eq!(second.blocks().len(), 2);
    assert_eq!(second.blocks()[1].as_text(), Some(""));
    assert_eq!(second.close(), CloseOutcome::Skipped);
}

#[test]
fn share_text_and_duplicate_source_reflect_live_state() {
    let repo = FlakyRepo::new();
    let clock = ManualClock::new(START_MS);
    let mut editor = editor(&repo, &clock);
    editor.open(None);
    let id = first_text_id(&editor);
    editor.set_title(TextFieldState::caret_at_end("Trip"));
    editor.edit_block(&id, TextFieldState::caret_at_end("pack bags"));
    editor.insert_images(&["ok:map.png".to_string()]);

    assert_eq!(editor.share_text(), "Trip\n\npack bags\n[Image]");
    let source = editor.duplicate_source().unwrap();
    assert_eq!(
        source,
        blocknote_core::DuplicateSource::Stored(editor.note_id())
    );
}
