//! Note repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, upsert and bulk delete over the `notes` table.
//! - Provide per-note watches that re-emit after every write to that note.
//!
//! # Invariants
//! - `insert` always creates a new row; the incoming `id` is ignored.
//! - `upsert` with `UNSAVED_NOTE_ID` inserts, otherwise writes the row with
//!   that id (creating it when absent).
//! - `image_uris` is stored as a JSON string array.
//! - No watcher lock is held while sending to watchers.

use crate::db::DbError;
use crate::model::note::{Note, NoteId};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    title,
    content,
    timestamp,
    drawing_overlay_data,
    image_uris
FROM notes";

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage error for note persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(NoteId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted note data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Stream of values for one note id.
///
/// The first item is the value at subscription time; each later item is the
/// fresh value after a write (`None` once the note is gone).
#[derive(Debug)]
pub struct NoteWatch {
    note_id: NoteId,
    receiver: Receiver<Option<Note>>,
}

impl NoteWatch {
    pub fn note_id(&self) -> NoteId {
        self.note_id
    }

    /// Returns the next pending emission without blocking.
    pub fn try_next(&self) -> Option<Option<Note>> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits up to `timeout` for the next emission.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Option<Note>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains every pending emission.
    pub fn drain(&self) -> Vec<Option<Note>> {
        self.receiver.try_iter().collect()
    }
}

/// Repository interface for notes.
pub trait NoteRepository {
    /// Gets one note by id.
    fn get_by_id(&self, id: NoteId) -> RepoResult<Option<Note>>;
    /// Subscribes to one note id.
    fn watch(&self, id: NoteId) -> RepoResult<NoteWatch>;
    /// Lists all notes, newest `timestamp` first.
    fn list_all(&self) -> RepoResult<Vec<Note>>;
    /// Inserts a new row and returns the store-assigned id.
    fn insert(&self, note: &Note) -> RepoResult<NoteId>;
    /// Updates an existing row.
    fn update(&self, note: &Note) -> RepoResult<()>;
    /// Inserts when `note.id` is the unsaved sentinel, otherwise writes that row.
    fn upsert(&self, note: &Note) -> RepoResult<NoteId>;
    /// Deletes one row.
    fn delete(&self, id: NoteId) -> RepoResult<()>;
    /// Deletes all listed rows and returns how many existed.
    fn delete_by_ids(&self, ids: &[NoteId]) -> RepoResult<usize>;
}

impl<R: NoteRepository + ?Sized> NoteRepository for &R {
    fn get_by_id(&self, id: NoteId) -> RepoResult<Option<Note>> {
        (**self).get_by_id(id)
    }

    fn watch(&self, id: NoteId) -> RepoResult<NoteWatch> {
        (**self).watch(id)
    }

    fn list_all(&self) -> RepoResult<Vec<Note>> {
        (**self).list_all()
    }

    fn insert(&self, note: &Note) -> RepoResult<NoteId> {
        (**self).insert(note)
    }

    fn update(&self, note: &Note) -> RepoResult<()> {
        (**self).update(note)
    }

    fn upsert(&self, note: &Note) -> RepoResult<NoteId> {
        (**self).upsert(note)
    }

    fn delete(&self, id: NoteId) -> RepoResult<()> {
        (**self).delete(id)
    }

    fn delete_by_ids(&self, ids: &[NoteId]) -> RepoResult<usize> {
        (**self).delete_by_ids(ids)
    }
}

struct Watcher {
    watch_id: u64,
    note_id: NoteId,
    sender: Sender<Option<Note>>,
}

#[derive(Default)]
struct WatchRegistry {
    next_watch_id: u64,
    watchers: Vec<Watcher>,
}

/// SQLite-backed note repository owning one migrated connection.
pub struct SqliteNoteRepository {
    conn: Connection,
    registry: Mutex<WatchRegistry>,
}

impl SqliteNoteRepository {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `InvalidData` when the `notes` table or one of its columns is missing.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn,
            registry: Mutex::new(WatchRegistry::default()),
        })
    }

    /// Opens (migrating when needed) the database file at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> RepoResult<Self> {
        Self::try_new(crate::db::open_db(path)?)
    }

    /// Borrows the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn notify(&self, note_id: NoteId) {
        let targets = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .watchers
                .iter()
                .filter(|watcher| watcher.note_id == note_id)
                .map(|watcher| (watcher.watch_id, watcher.sender.clone()))
                .collect::<Vec<_>>()
        };
        if targets.is_empty() {
            return;
        }

        let current = match self.get_by_id(note_id) {
            Ok(current) => current,
            Err(err) => {
                warn!(
                    "event=note_watch_notify module=repo status=error note_id={} error={}",
                    note_id,
                    err
                );
                return;
            }
        };

        let closed = targets
            .into_iter()
            .filter(|(_, sender)| sender.send(current.clone()).is_err())
            .map(|(watch_id, _)| watch_id)
            .collect::<BTreeSet<_>>();
        if !closed.is_empty() {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .watchers
                .retain(|watcher| !closed.contains(&watcher.watch_id));
        }
    }
}

impl NoteRepository for SqliteNoteRepository {
    fn get_by_id(&self, id: NoteId) -> RepoResult<Option<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_note_row(row)?));
        }
        Ok(None)
    }

    fn watch(&self, id: NoteId) -> RepoResult<NoteWatch> {
        let current = self.get_by_id(id)?;
        let (sender, receiver) = mpsc::channel();
        // The receiver is still alive here, so the initial send cannot fail.
        let _ = sender.send(current);

        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let watch_id = registry.next_watch_id;
        registry.next_watch_id += 1;
        registry.watchers.push(Watcher {
            watch_id,
            note_id: id,
            sender,
        });

        Ok(NoteWatch {
            note_id: id,
            receiver,
        })
    }

    fn list_all(&self) -> RepoResult<Vec<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} ORDER BY timestamp DESC, id DESC;"))?;
        let mut rows = stmt.query([])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn insert(&self, note: &Note) -> RepoResult<NoteId> {
        let image_uris = encode_image_uris(&note.image_uris)?;
        self.conn.execute(
            "INSERT INTO notes (
                title,
                content,
                timestamp,
                drawing_overlay_data,
                image_uris
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                note.title.as_str(),
                note.content.as_str(),
                note.timestamp,
                note.drawing_overlay_data.as_deref(),
                image_uris,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.notify(id);
        Ok(id)
    }

    fn update(&self, note: &Note) -> RepoResult<()> {
        let image_uris = encode_image_uris(&note.image_uris)?;
        let changed = self.conn.execute(
            "UPDATE notes
             SET
                title = ?1,
                content = ?2,
                timestamp = ?3,
                drawing_overlay_data = ?4,
                image_uris = ?5
             WHERE id = ?6;",
            params![
                note.title.as_str(),
                note.content.as_str(),
                note.timestamp,
                note.drawing_overlay_data.as_deref(),
                image_uris,
                note.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(note.id));
        }

        self.notify(note.id);
        Ok(())
    }

    fn upsert(&self, note: &Note) -> RepoResult<NoteId> {
        if note.is_new() {
            return self.insert(note);
        }

        let image_uris = encode_image_uris(&note.image_uris)?;
        self.conn.execute(
            "INSERT INTO notes (
                id,
                title,
                content,
                timestamp,
                drawing_overlay_data,
                image_uris
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                timestamp = excluded.timestamp,
                drawing_overlay_data = excluded.drawing_overlay_data,
                image_uris = excluded.image_uris;",
            params![
                note.id,
                note.title.as_str(),
                note.content.as_str(),
                note.timestamp,
                note.drawing_overlay_data.as_deref(),
                image_uris,
            ],
        )?;

        self.notify(note.id);
        Ok(note.id)
    }

    fn delete(&self, id: NoteId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM notes WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        self.notify(id);
        Ok(())
    }

    fn delete_by_ids(&self, ids: &[NoteId]) -> RepoResult<usize> {
        let unique = ids.iter().copied().collect::<BTreeSet<_>>();
        if unique.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; unique.len()].join(", ");
        let changed = self.conn.execute(
            &format!("DELETE FROM notes WHERE id IN ({placeholders});"),
            params_from_iter(unique.iter().map(|id| Value::Integer(*id))),
        )?;

        for id in unique {
            self.notify(id);
        }
        Ok(changed)
    }
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let id: NoteId = row.get("id")?;
    let raw_uris: String = row.get("image_uris")?;
    let image_uris = serde_json::from_str::<Vec<String>>(&raw_uris).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid image_uris value for note {id} in notes.image_uris: {err}"
        ))
    })?;

    Ok(Note {
        id,
        title: row.get("title")?,
        content: row.get("content")?,
        timestamp: row.get("timestamp")?,
        drawing_overlay_data: row.get("drawing_overlay_data")?,
        image_uris,
    })
}

fn encode_image_uris(uris: &[String]) -> RepoResult<String> {
    serde_json::to_string(uris)
        .map_err(|err| RepoError::InvalidData(format!("failed to encode image_uris: {err}")))
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    if !table_exists(conn, "notes")? {
        return Err(RepoError::InvalidData(
            "required table `notes` is missing; open the database through db::open_db"
                .to_string(),
        ));
    }
    for column in [
        "id",
        "title",
        "content",
        "timestamp",
        "drawing_overlay_data",
        "image_uris",
    ] {
        if !table_has_column(conn, "notes", column)? {
            return Err(RepoError::InvalidData(format!(
                "required column `notes.{column}` is missing"
            )));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
