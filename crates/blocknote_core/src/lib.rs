//! Core domain logic for BlockNote.
//! This crate is the single source of truth for note, block and history
//! invariants.

pub mod clock;
pub mod codec;
pub mod config;
pub mod db;
pub mod history;
pub mod image;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::block_codec::{decode, decode_or_legacy, encode, BlockCodecError};
pub use config::{ConfigError, CoreConfig};
pub use history::edit_history::{EditHistory, RecordOutcome};
pub use image::image_store::{FsImageStore, ImageIoError, ImageStore};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::block::{BlockId, ContentBlock};
pub use model::note::{Note, NoteId, UNSAVED_NOTE_ID};
pub use model::snapshot::{EditorSnapshot, TextFieldState, TextRange};
pub use repo::note_repo::{NoteRepository, NoteWatch, RepoError, RepoResult, SqliteNoteRepository};
pub use service::editor_controller::{
    CaptureOutcome, CloseOutcome, EditorController, EditorOptions, LoadOutcome, SaveOutcome,
};
pub use service::note_service::{DuplicateSource, NoteService, NoteServiceError, NoteSummary};
pub use service::notice::{Notice, NoticeKind};
pub use service::transfer_service::{
    ExportOptions, ExportReport, ImportReport, SkippedEntry, TransferError, TransferService,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
