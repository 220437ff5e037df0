//! Persisted forms of block sequences.
//!
//! # Responsibility
//! - Encode/decode block sequences to the JSON stored in `notes.content`.
//! - Derive read projections (image uris, list preview, share text).
//!
//! # Invariants
//! - Decoding never guesses: malformed input is an error, and only callers
//!   apply the legacy plain-text fallback.

pub mod block_codec;
