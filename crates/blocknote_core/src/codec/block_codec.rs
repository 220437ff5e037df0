//! JSON codec for block sequences.
//!
//! # Responsibility
//! - Write block arrays with a `type` discriminator and every field present.
//! - Read block arrays strictly, reporting malformed input as `Parse`.
//! - Provide the caller-side legacy fallback for pre-block plain-text notes.
//!
//! # Invariants
//! - `decode(encode(blocks))` is meaningfully equal to `blocks`.
//! - `decode_or_legacy(s)` never fails and yields exactly one text block
//!   holding `s` when `s` is not a block array.

use crate::model::block::ContentBlock;
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default preview length for note list cards, in chars.
pub const DEFAULT_PREVIEW_CHARS: usize = 150;

const SHARE_IMAGE_PLACEHOLDER: &str = "[Image]";

/// Block codec failure.
#[derive(Debug)]
pub enum BlockCodecError {
    /// Input is not a JSON array of recognized blocks.
    Parse(serde_json::Error),
    /// Serialization failed.
    Encode(serde_json::Error),
}

impl Display for BlockCodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid block content: {err}"),
            Self::Encode(err) => write!(f, "failed to encode blocks: {err}"),
        }
    }
}

impl Error for BlockCodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) | Self::Encode(err) => Some(err),
        }
    }
}

/// Encodes blocks as a JSON array.
pub fn encode(blocks: &[ContentBlock]) -> Result<String, BlockCodecError> {
    serde_json::to_string(blocks).map_err(BlockCodecError::Encode)
}

/// Decodes a JSON block array.
///
/// # Errors
/// - `Parse` when `content` is not JSON, not an array, or contains an element
///   with an unknown `type` or missing required fields.
pub fn decode(content: &str) -> Result<Vec<ContentBlock>, BlockCodecError> {
    serde_json::from_str(content).map_err(BlockCodecError::Parse)
}

/// Decodes blocks, treating undecodable content as one legacy text block.
pub fn decode_or_legacy(content: &str) -> Vec<ContentBlock> {
    match decode(content) {
        Ok(blocks) => blocks,
        Err(err) => {
            debug!(
                "event=content_decode module=codec status=legacy_fallback content_len={} error={}",
                content.len(),
                err
            );
            vec![ContentBlock::text(content)]
        }
    }
}

/// Returns the uris of all image blocks in order.
pub fn image_uris(blocks: &[ContentBlock]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|block| block.as_image_uri().map(str::to_string))
        .collect()
}

/// Derives the list-card preview text from stored content.
///
/// Block content joins trimmed text blocks with newlines, then drops the
/// blank lines left at either end by empty blocks; legacy plain text is shown
/// as stored. Both are cut to `max_chars` chars.
pub fn content_preview(content: &str, max_chars: usize) -> String {
    match decode(content) {
        Ok(blocks) => {
            let joined = blocks
                .iter()
                .filter_map(ContentBlock::as_text)
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("\n");
            truncate_chars(joined.trim(), max_chars)
        }
        Err(_) => truncate_chars(content, max_chars),
    }
}

/// Returns the first image uri of stored content, if any.
pub fn cover_image(content: &str) -> Option<String> {
    decode(content)
        .ok()?
        .iter()
        .find_map(|block| block.as_image_uri().map(str::to_string))
}

/// Renders a note as plain text for the platform share sheet.
pub fn share_text(title: &str, blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    out.push_str(title);
    out.push_str("\n\n");
    for block in blocks {
        match block {
            ContentBlock::Text { text, .. } => out.push_str(text),
            ContentBlock::Image { .. } => out.push_str(SHARE_IMAGE_PLACEHOLDER),
        }
        out.push('\n');
    }
    out.trim().to_string()
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_writes_discriminator_and_default_fields() {
        let blocks = vec![
            ContentBlock::Text {
                id: "t1".to_string(),
                text: String::new(),
            },
            ContentBlock::Image {
                id: "i1".to_string(),
                uri: "file:///img/a.png".to_string(),
            },
        ];
        let json: serde_json::Value = serde_json::from_str(&encode(&blocks).unwrap()).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[0]["id"], "t1");
        assert_eq!(json[0]["text"], "");
        assert_eq!(json[1]["type"], "image");
        assert_eq!(json[1]["uri"], "file:///img/a.png");
    }

    #[test]
    fn decode_rejects_unknown_block_type() {
        let err = decode(r#"[{"type":"audio","id":"a","uri":"x"}]"#).unwrap_err();
        assert!(matches!(err, BlockCodecError::Parse(_)));
    }

    #[test]
    fn decode_ignores_unknown_keys_and_fills_missing_text() {
        let blocks = decode(r#"[{"type":"text","id":"t","extra":1}]"#).unwrap();
        assert_eq!(blocks[0].as_text(), Some(""));
        assert_eq!(blocks[0].id(), "t");
    }

    #[test]
    fn share_text_uses_placeholder_for_images() {
        let blocks = vec![
            ContentBlock::text("first"),
            ContentBlock::image("file:///a.png"),
            ContentBlock::text(""),
        ];
        assert_eq!(share_text("Title", &blocks), "Title\n\nfirst\n[Image]");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }
}
