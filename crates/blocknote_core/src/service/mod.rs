//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate codec, history, repository and image store calls into
//!   use-case level APIs.
//! - Keep UI/FFI layers decoupled from storage details.
//! - Turn I/O failures into notices or typed errors; nothing panics upward.

pub mod debounce;
pub mod editor_controller;
pub mod note_service;
pub mod notice;
pub mod transfer_service;
