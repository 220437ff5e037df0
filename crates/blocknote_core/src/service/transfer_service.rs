//! Portable JSON import/export of notes.
//!
//! # Responsibility
//! - Export notes (optionally with base64-embedded images and drawing data).
//! - Import exported documents as new notes with freshly written images.
//!
//! # Invariants
//! - A document whose top level is not a JSON array imports nothing.
//! - A malformed entry or a failed insert skips that entry only.
//! - Imported notes always get new ids; imported images always get new
//!   file names.
//! - Imported `image_uris` match the image blocks of the imported content.

use crate::clock::Clock;
use crate::codec::block_codec;
use crate::image::image_store::{uri_filename, ImageStore};
use crate::model::block::ContentBlock;
use crate::model::note::{Note, NoteId};
use crate::repo::note_repo::{NoteRepository, RepoError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// One embedded image in an exported note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedImage {
    pub filename: String,
    pub base64_data: String,
}

/// One element of the export document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteForExport {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub timestamp: i64,
    pub drawing_overlay_data: Option<String>,
    pub images: Vec<ExportedImage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_images: bool,
    pub include_drawings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Pretty-printed export document.
    pub json: String,
    pub exported: usize,
    /// Uris of images that could not be read.
    pub skipped_images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Position of the entry in the imported array.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub new_ids: Vec<NoteId>,
    pub skipped_entries: Vec<SkippedEntry>,
    /// Filenames of embedded images that could not be decoded or written.
    pub skipped_images: Vec<String>,
}

/// Import/export failure that aborts the whole operation.
#[derive(Debug)]
pub enum TransferError {
    /// The import document is not a JSON array.
    Format(serde_json::Error),
    /// The export document could not be serialized.
    Encode(serde_json::Error),
    /// Notes could not be listed for export.
    Storage(RepoError),
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format(err) => write!(f, "invalid import document: {err}"),
            Self::Encode(err) => write!(f, "failed to encode export document: {err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Format(err) | Self::Encode(err) => Some(err),
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<RepoError> for TransferError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

pub struct TransferService<R: NoteRepository, S: ImageStore, C: Clock> {
    repo: R,
    images: S,
    clock: C,
}

impl<R: NoteRepository, S: ImageStore, C: Clock> TransferService<R, S, C> {
    pub fn new(repo: R, images: S, clock: C) -> Self {
        Self {
            repo,
            images,
            clock,
        }
    }

    /// Exports the notes listed in `ids`, or every note when `ids` is empty.
    pub fn export_notes(
        &self,
        ids: &[NoteId],
        options: ExportOptions,
    ) -> Result<ExportReport, TransferError> {
        let started_at = Instant::now();
        let notes = self
            .repo
            .list_all()?
            .into_iter()
            .filter(|note| ids.is_empty() || ids.contains(&note.id))
            .collect::<Vec<_>>();

        let mut skipped_images = Vec::new();
        let entries = notes
            .into_iter()
            .map(|note| {
                let images = if options.include_images {
                    self.export_images(&note.image_uris, &mut skipped_images)
                } else {
                    Vec::new()
                };
                NoteForExport {
                    id: note.id,
                    title: note.title,
                    content: note.content,
                    timestamp: note.timestamp,
                    drawing_overlay_data: note
                        .drawing_overlay_data
                        .filter(|_| options.include_drawings),
                    images,
                }
            })
            .collect::<Vec<_>>();

        let json = serde_json::to_string_pretty(&entries).map_err(TransferError::Encode)?;
        info!(
            "event=notes_export module=transfer status=ok exported={} skipped_images={} include_images={} include_drawings={} duration_ms={}",
            entries.len(),
            skipped_images.len(),
            options.include_images,
            options.include_drawings,
            started_at.elapsed().as_millis()
        );
        Ok(ExportReport {
            json,
            exported: entries.len(),
            skipped_images,
        })
    }

    /// Imports an export document as new notes.
    ///
    /// # Errors
    /// - `Format` when `json` is not a JSON array; nothing is inserted.
    pub fn import_notes(&self, json: &str) -> Result<ImportReport, TransferError> {
        let started_at = Instant::now();
        let entries: Vec<serde_json::Value> = match serde_json::from_str(json) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "event=notes_import module=transfer status=error error_code=invalid_document error={}",
                    err
                );
                return Err(TransferError::Format(err));
            }
        };

        let mut report = ImportReport::default();
        for (index, value) in entries.into_iter().enumerate() {
            let entry = match serde_json::from_value::<NoteForExport>(value) {
                Ok(entry) => entry,
                Err(err) => {
                    report.skipped_entries.push(SkippedEntry {
                        index,
                        reason: format!("malformed entry: {err}"),
                    });
                    continue;
                }
            };

            let note = self.imported_note(entry, &mut report.skipped_images);
            match self.repo.insert(&note) {
                Ok(id) => report.new_ids.push(id),
                Err(err) => {
                    warn!(
                        "event=notes_import module=transfer status=entry_failed index={} error={}",
                        index, err
                    );
                    report.skipped_entries.push(SkippedEntry {
                        index,
                        reason: format!("storage error: {err}"),
                    });
                }
            }
        }

        info!(
            "event=notes_import module=transfer status=ok imported={} skipped_entries={} skipped_images={} duration_ms={}",
            report.new_ids.len(),
            report.skipped_entries.len(),
            report.skipped_images.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn export_images(&self, uris: &[String], skipped: &mut Vec<String>) -> Vec<ExportedImage> {
        uris.iter()
            .filter_map(|uri| match self.images.read(uri) {
                Ok(bytes) => Some(ExportedImage {
                    filename: uri_filename(uri)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("image_{}.jpg", Uuid::new_v4())),
                    base64_data: BASE64.encode(bytes),
                }),
                Err(err) => {
                    warn!(
                        "event=image_export module=transfer status=skipped error={}",
                        err
                    );
                    skipped.push(uri.clone());
                    None
                }
            })
            .collect()
    }

    fn imported_note(&self, entry: NoteForExport, skipped_images: &mut Vec<String>) -> Note {
        let mut written = Vec::new();
        for image in &entry.images {
            match self.write_image(image) {
                Ok(uri) => written.push((image.filename.clone(), uri)),
                Err(reason) => {
                    warn!(
                        "event=image_import module=transfer status=skipped reason={}",
                        reason
                    );
                    skipped_images.push(image.filename.clone());
                }
            }
        }

        let (content, image_uris) = match block_codec::decode(&entry.content) {
            Ok(blocks) => {
                let rewritten = rewrite_image_uris(&blocks, written);
                let uris = block_codec::image_uris(&rewritten);
                if rewritten == blocks {
                    (entry.content, uris)
                } else {
                    match block_codec::encode(&rewritten) {
                        Ok(content) => (content, uris),
                        Err(_) => (entry.content, block_codec::image_uris(&blocks)),
                    }
                }
            }
            Err(_) => (
                entry.content,
                written.into_iter().map(|(_, uri)| uri).collect(),
            ),
        };

        let timestamp = if entry.timestamp == 0 {
            self.clock.now_ms()
        } else {
            entry.timestamp
        };
        let mut note = Note::new_unsaved(entry.title, content, timestamp);
        note.drawing_overlay_data = entry.drawing_overlay_data;
        note.image_uris = image_uris;
        note
    }

    fn write_image(&self, image: &ExportedImage) -> Result<String, String> {
        let compact = image
            .base64_data
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect::<String>();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|err| format!("invalid_base64 {err}"))?;
        self.images
            .write_new(&image.filename, &bytes)
            .map_err(|err| format!("write_failed {err}"))
    }
}

/// Points image blocks at freshly written files.
///
/// Each written file is claimed by at most one block, in document order, so
/// images sharing a filename keep distinct files.
fn rewrite_image_uris(
    blocks: &[ContentBlock],
    mut written: Vec<(String, String)>,
) -> Vec<ContentBlock> {
    blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Image { id, uri } => {
                let replacement = uri_filename(uri).and_then(|name| {
                    let index = written.iter().position(|(filename, _)| filename == name)?;
                    Some(written.remove(index).1)
                });
                ContentBlock::Image {
                    id: id.clone(),
                    uri: replacement.unwrap_or_else(|| uri.clone()),
                }
            }
            ContentBlock::Text { .. } => block.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_camel_case_keys() {
        let entry = NoteForExport {
            id: 4,
            title: "t".to_string(),
            content: "c".to_string(),
            timestamp: 9,
            drawing_overlay_data: None,
            images: vec![ExportedImage {
                filename: "a.png".to_string(),
                base64_data: "AAEC".to_string(),
            }],
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["drawingOverlayData"], serde_json::Value::Null);
        assert_eq!(value["images"][0]["base64Data"], "AAEC");
    }

    #[test]
    fn entry_fields_default_when_missing() {
        let entry: NoteForExport = serde_json::from_str(r#"{"title": "only"}"#).unwrap();
        assert_eq!(entry.title, "only");
        assert_eq!(entry.content, "");
        assert_eq!(entry.timestamp, 0);
        assert!(entry.images.is_empty());
    }

    #[test]
    fn rewrite_matches_last_uri_segment() {
        let blocks = vec![
            ContentBlock::image("content://old.provider/note_images/a.png"),
            ContentBlock::image("file:///x/other.png"),
        ];
        let written = vec![("a.png".to_string(), "file:///new/1_a.png".to_string())];
        let rewritten = rewrite_image_uris(&blocks, written);
        assert_eq!(rewritten[0].as_image_uri(), Some("file:///new/1_a.png"));
        assert_eq!(rewritten[0].id(), blocks[0].id());
        assert_eq!(rewritten[1].as_image_uri(), Some("file:///x/other.png"));
    }

    #[test]
    fn rewrite_gives_same_named_images_distinct_files() {
        let blocks = vec![
            ContentBlock::image("file:///camera/photo.jpg"),
            ContentBlock::text("between"),
            ContentBlock::image("file:///downloads/photo.jpg"),
        ];
        let written = vec![
            ("photo.jpg".to_string(), "file:///new/1_photo.jpg".to_string()),
            ("photo.jpg".to_string(), "file:///new/2_photo.jpg".to_string()),
        ];
        let rewritten = rewrite_image_uris(&blocks, written);
        assert_eq!(rewritten[0].as_image_uri(), Some("file:///new/1_photo.jpg"));
        assert_eq!(rewritten[2].as_image_uri(), Some("file:///new/2_photo.jpg"));
    }
}
