//! Linear undo/redo history for the note editor.
//!
//! # Responsibility
//! - Keep an append-only snapshot list with an explicit cursor.
//! - Discard the redo branch when a new edit lands after undo.
//!
//! # Invariants
//! - `history[0]` (the load-time snapshot) is never discarded.
//! - Once initialized, the cursor is always a valid index.

pub mod edit_history;
