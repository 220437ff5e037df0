//! Managed image storage.
//!
//! # Responsibility
//! - Copy user-picked images into app-owned storage.
//! - Read and write managed images for export/import.
//!
//! # Invariants
//! - Managed files always get fresh unique names; caller-supplied names are
//!   hints only.

pub mod image_store;
