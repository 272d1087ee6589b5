//! Storage layer
//!
//! The file-system bridge for project files.
//!
//! ## Format
//!
//! A project is one `.ketabi` file holding gzip-compressed JSON:
//! `{ "meta": {...}, "pages": [...] }`. Writes go through a temp file and a
//! rename so a crash never leaves a half-written project behind.

pub mod error;
pub mod persistence;

pub use error::{StorageError, StorageResult};
pub use persistence::{atomic_write, GzipProjectFiles, ProjectFiles};
