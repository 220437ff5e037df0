//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the note data access contract consumed by the editor and services.
//! - Isolate SQLite query details from orchestration code.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.
//! - Read paths reject damaged persisted state instead of masking it.

pub mod note_repo;
