//! Editor snapshot types captured by the edit history.
//!
//! A snapshot stores the exact input-field state (text plus selection) of the
//! title and of every text block, so undo restores the caret and not only the
//! characters.

use crate::model::block::{blocks_meaningfully_equal, BlockId, ContentBlock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selection range in char offsets. A collapsed range is a caret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn caret(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Live state of one input field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFieldState {
    pub text: String,
    pub selection: TextRange,
}

impl TextFieldState {
    /// Builds a field state, clamping the selection into the text bounds.
    pub fn new(text: impl Into<String>, selection: TextRange) -> Self {
        let text = text.into();
        let len = text.chars().count();
        let start = selection.start.min(len);
        let end = selection.end.min(len);
        Self {
            text,
            selection: TextRange { start, end },
        }
    }

    /// Field state with the caret placed after the last char.
    pub fn caret_at_end(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.chars().count();
        Self {
            text,
            selection: TextRange::caret(len),
        }
    }
}

/// Immutable capture of the editor at one point in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub title: TextFieldState,
    pub blocks: Vec<ContentBlock>,
    /// One entry per text block in `blocks`, keyed by block id.
    pub text_states: BTreeMap<BlockId, TextFieldState>,
}

impl EditorSnapshot {
    /// Builds a snapshot, completing `live_states` for every text block.
    ///
    /// Entries for ids that are not text blocks of `blocks` are dropped; text
    /// blocks without a live entry get a caret-at-end state.
    pub fn capture(
        title: TextFieldState,
        blocks: Vec<ContentBlock>,
        live_states: &BTreeMap<BlockId, TextFieldState>,
    ) -> Self {
        let text_states = blocks
            .iter()
            .filter_map(|block| {
                let text = block.as_text()?;
                let state = live_states
                    .get(block.id())
                    .filter(|state| state.text == text)
                    .cloned()
                    .unwrap_or_else(|| TextFieldState::caret_at_end(text));
                Some((block.id().to_string(), state))
            })
            .collect();
        Self {
            title,
            blocks,
            text_states,
        }
    }

    /// History equality: exact title text and meaningful block equality.
    ///
    /// Selections are not compared; moving the caret alone is not an edit.
    pub fn meaningfully_eq(&self, other: &Self) -> bool {
        self.title.text == other.title.text
            && blocks_meaningfully_equal(&self.blocks, &other.blocks)
    }
}
