//! Content block model.
//!
//! # Responsibility
//! - Define the closed `Text | Image` block sum type.
//! - Provide the semantic ("meaningful") equality used by history capture and
//!   dirty checks.
//! - Provide the persistence trimming rule for trailing blank text blocks.
//!
//! # Invariants
//! - A block never changes variant; a text edit produces a new value with the
//!   same `id`.
//! - Blank text blocks never make two sequences meaningfully different.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable block identifier. Opaque to the core; UUID v4 text when generated here.
pub type BlockId = String;

/// Generates a fresh block id.
pub fn new_block_id() -> BlockId {
    Uuid::new_v4().to_string()
}

/// One unit of note content.
///
/// Serialized with a single `type` discriminator (`text` / `image`) so the
/// persisted array stays readable and decoding can switch exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Editable paragraph. `text` may be empty.
    Text {
        #[serde(default = "new_block_id")]
        id: BlockId,
        #[serde(default)]
        text: String,
    },
    /// Reference to a managed image file. Pixels are never embedded.
    Image {
        #[serde(default = "new_block_id")]
        id: BlockId,
        uri: String,
    },
}

impl ContentBlock {
    /// Creates a text block with a generated id.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            id: new_block_id(),
            text: text.into(),
        }
    }

    /// Creates an image block with a generated id.
    pub fn image(uri: impl Into<String>) -> Self {
        Self::Image {
            id: new_block_id(),
            uri: uri.into(),
        }
    }

    /// Returns the stable block id.
    pub fn id(&self) -> &str {
        match self {
            Self::Text { id, .. } | Self::Image { id, .. } => id.as_str(),
        }
    }

    /// Returns the text of a text block, `None` for images.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text.as_str()),
            Self::Image { .. } => None,
        }
    }

    /// Returns the uri of an image block, `None` for text.
    pub fn as_image_uri(&self) -> Option<&str> {
        match self {
            Self::Image { uri, .. } => Some(uri.as_str()),
            Self::Text { .. } => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// True for a text block whose text is empty or whitespace only.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text { text, .. } if text.trim().is_empty())
    }

    /// Returns a copy of this text block carrying `text`, keeping the id.
    ///
    /// Image blocks are returned unchanged.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        match self {
            Self::Text { id, .. } => Self::Text {
                id: id.clone(),
                text: text.into(),
            },
            Self::Image { .. } => self.clone(),
        }
    }

    /// Semantic equality: trimmed text for text blocks, uri for images.
    ///
    /// Ids are ignored; two blocks of different variants are never equal.
    pub fn meaningfully_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text { text: left, .. }, Self::Text { text: right, .. }) => {
                left.trim() == right.trim()
            }
            (Self::Image { uri: left, .. }, Self::Image { uri: right, .. }) => left == right,
            _ => false,
        }
    }
}

/// Compares two block sequences after dropping blank text blocks from both.
pub fn blocks_meaningfully_equal(left: &[ContentBlock], right: &[ContentBlock]) -> bool {
    let mut left = left.iter().filter(|block| !block.is_blank_text());
    let mut right = right.iter().filter(|block| !block.is_blank_text());
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(a), Some(b)) if a.meaningfully_eq(b) => continue,
            _ => return false,
        }
    }
}

/// True when any block carries content: non-blank text or any image.
pub fn has_meaningful_blocks(blocks: &[ContentBlock]) -> bool {
    blocks.iter().any(|block| !block.is_blank_text())
}

/// Returns the block sequence as it should be persisted.
///
/// Trailing blank text blocks are dropped. A note is never persisted with
/// zero blocks, so an all-blank sequence becomes one empty text block.
pub fn persistable_blocks(blocks: &[ContentBlock]) -> Vec<ContentBlock> {
    let keep = blocks
        .iter()
        .rposition(|block| !block.is_blank_text())
        .map_or(0, |index| index + 1);
    if keep == 0 {
        return vec![ContentBlock::text("")];
    }
    blocks[..keep].to_vec()
}

/// Reassigns fresh ids to blocks whose id already appeared earlier.
///
/// Returns the number of reassigned blocks. Only damaged persisted data can
/// contain duplicates; the first occurrence keeps its id.
pub fn ensure_unique_ids(blocks: &mut [ContentBlock]) -> usize {
    let mut seen = BTreeSet::new();
    let mut reassigned = 0;
    for block in blocks.iter_mut() {
        if seen.insert(block.id().to_string()) {
            continue;
        }
        let fresh = new_block_id();
        match block {
            ContentBlock::Text { id, .. } | ContentBlock::Image { id, .. } => *id = fresh.clone(),
        }
        seen.insert(fresh);
        reassigned += 1;
    }
    reassigned
}
