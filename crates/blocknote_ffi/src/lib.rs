//! FFI crate for BlockNote.
//!
//! Dart calls the sync functions in [`api`] through flutter_rust_bridge.

pub mod api;
