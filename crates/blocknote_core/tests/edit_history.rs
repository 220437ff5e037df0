use blocknote_core::model::snapshot::TextRange;
use blocknote_core::{ContentBlock, EditHistory, EditorSnapshot, RecordOutcome, TextFieldState};
use std::collections::BTreeMap;

fn snapshot(title: &str, texts: &[&str]) -> EditorSnapshot {
    let blocks = texts
        .iter()
        .map(|text| ContentBlock::text(*text))
        .collect::<Vec<_>>();
    EditorSnapshot::capture(TextFieldState::caret_at_end(title), blocks, &BTreeMap::new())
}

fn initialized(title: &str) -> EditHistory {
    let mut history = EditHistory::new();
    history.initialize(snapshot(title, &[""]));
    history
}

#[test]
fn record_before_initialize_is_skipped() {
    let mut history = EditHistory::new();
    assert_eq!(history.record(snapshot("a", &[])), RecordOutcome::Skipped);
    assert!(history.is_empty());
    assert_eq!(history.cursor(), None);
    assert!(!history.can_undo());
    assert!(!history.can_redo());
}

#[test]
fn meaningfully_equal_record_is_a_no_op() {
    let mut history = initialized("");
    assert_eq!(history.record(snapshot("t", &["hello"])), RecordOutcome::Recorded);

    let same = snapshot("t", &["  hello  ", "", " "]);
    assert_eq!(history.record(same), RecordOutcome::Skipped);
    assert_eq!(history.len(), 2);
    assert_eq!(history.cursor(), Some(1));
}

#[test]
fn undo_and_redo_walk_the_cursor() {
    let mut history = initialized("");
    history.record(snapshot("a", &[]));
    history.record(snapshot("ab", &[]));
    assert!(history.is_editing());

    assert_eq!(history.undo().unwrap().title.text, "a");
    assert_eq!(history.undo().unwrap().title.text, "");
    assert!(history.undo().is_none());
    assert_eq!(history.cursor(), Some(0));
    assert!(!history.is_editing());
    assert!(history.can_redo());

    assert_eq!(history.redo().unwrap().title.text, "a");
    assert_eq!(history.redo().unwrap().title.text, "ab");
    assert!(history.redo().is_none());
    assert_eq!(history.cursor(), Some(2));
}

#[test]
fn record_after_undo_discards_redo_branch() {
    let mut history = initialized("");
    history.record(snapshot("a", &[]));
    history.record(snapshot("ab", &[]));
    history.record(snapshot("abc", &[]));
    history.undo();
    history.undo();

    assert_eq!(history.record(snapshot("x", &[])), RecordOutcome::Recorded);
    assert!(!history.can_redo());
    assert_eq!(history.len(), 3);
    let titles = history
        .entries()
        .iter()
        .map(|entry| entry.title.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["", "a", "x"]);
}

#[test]
fn initial_entry_survives_any_record_sequence() {
    let mut history = initialized("origin");
    for round in 0..20 {
        let title = format!("t{round}");
        history.record(snapshot(&title, &[]));
        if round % 3 == 0 {
            history.undo();
        }
        if round % 5 == 0 {
            history.undo();
            history.undo();
        }
        let cursor = history.cursor().unwrap();
        assert!(cursor < history.len());
        assert_eq!(history.initial().unwrap().title.text, "origin");
    }
}

#[test]
fn undo_then_redo_restores_exact_field_state() {
    let block = ContentBlock::text("hello world");
    let mut live = BTreeMap::new();
    live.insert(
        block.id().to_string(),
        TextFieldState::new("hello world", TextRange { start: 2, end: 5 }),
    );
    let edited = EditorSnapshot::capture(
        TextFieldState::new("title", TextRange::caret(3)),
        vec![block],
        &live,
    );

    let mut history = initialized("");
    history.record(edited.clone());
    history.undo();
    let restored = history.redo().unwrap();

    assert_eq!(restored, &edited);
    assert!(restored.meaningfully_eq(&edited));
}

#[test]
fn current_tracks_cursor() {
    let mut history = initialized("");
    history.record(snapshot("a", &[]));
    assert_eq!(history.current().unwrap().title.text, "a");
    history.undo();
    assert_eq!(history.current().unwrap().title.text, "");
}
