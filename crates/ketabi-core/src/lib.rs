//! Ketabi Core Library
//!
//! This crate provides the core of Ketabi, a multi-page rich document
//! editor that saves each project to a single `.ketabi` file and exports it
//! for packaging as a book.
//!
//! # Architecture
//!
//! - **Store**: owns the open project in memory; edits apply immediately
//! - **Sync engine**: debounced, single-writer persistence of store changes
//! - **Export**: renders page content to XHTML and builds the manifest that
//!   packagers consume
//!
//! # Quick Start
//!
//! ```text
//! let files: Arc<dyn ProjectFiles> = Arc::new(GzipProjectFiles::new());
//! let mut session = Session::create(files, &config, "My Book", MetadataOptions::default()).await?;
//!
//! session.store_mut().create_page("Chapter one");
//! session.store_mut().edit_active_page_content(tree)?;
//!
//! session.export(&XhtmlDirectoryPackager::new(), &out_dir).await?;
//! session.close().await?;
//! ```
//!
//! # Modules
//!
//! - `session`: one open project (main entry point)
//! - `store`: in-memory pages, active page, metadata
//! - `document`: page content node tree and embed validation
//! - `models`: project, page and metadata records
//! - `sync`: debounced persistence engine
//! - `storage`: project file bridge
//! - `export`: markup rendering, manifest, packagers
//! - `project`: project naming and creation
//! - `config`: application configuration

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod models;
pub mod project;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::Config;
pub use document::{
    Alignment, CorruptNode, EmbedNode, HeadingLevel, ListKind, Node, NodeTree, TextFormat,
};
pub use error::{Error, Result, ValidationError};
pub use export::{ExportError, Manifest, Packager, XhtmlDirectoryPackager};
pub use models::{Creator, Metadata, Page, PageId, ProjectFile, ProjectPatch};
pub use project::MetadataOptions;
pub use session::Session;
pub use storage::{GzipProjectFiles, ProjectFiles, StorageError};
pub use store::{Store, StoreError};
pub use sync::{SyncEvent, SyncHandle, SyncState};
