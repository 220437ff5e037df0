//! Domain model for block-based notes and editor snapshots.
//!
//! # Responsibility
//! - Define the content block sum type and its semantic equality rules.
//! - Define the persisted `Note` record and in-memory editor snapshots.
//!
//! # Invariants
//! - Every block carries a stable string id that is never reassigned.
//! - Block ids are unique within one note's block sequence.
//!
//! # See also
//! - crate::codec for the persisted wire form of block sequences.

pub mod block;
pub mod note;
pub mod snapshot;
