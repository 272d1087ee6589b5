//! Document store
//!
//! The `Store` is the single in-memory owner of an open project: its
//! metadata, its ordered pages, and which page is active.
//!
//! Edits apply immediately. Every edit that changes persisted state marks
//! the store dirty and hands the changed fields to the sync engine (when one
//! is attached) without waiting for the write.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::new(meta);
//! store.attach_sync(handle);
//!
//! let id = store.create_page("Chapter one");
//! store.edit_active_page_content(tree)?;
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::document::NodeTree;
use crate::models::{Metadata, Page, PageId, ProjectFile, ProjectPatch};
use crate::sync::SyncHandle;

/// Errors from store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No active page to edit")]
    NoActivePage,
}

/// In-memory owner of an open project
#[derive(Debug)]
pub struct Store {
    meta: Metadata,
    pages: Vec<Page>,
    active: Option<PageId>,
    dirty: bool,
    sync: Option<SyncHandle>,
}

impl Store {
    /// An empty store around the given metadata
    pub fn new(meta: Metadata) -> Self {
        Self {
            meta,
            pages: Vec::new(),
            active: None,
            dirty: false,
            sync: None,
        }
    }

    /// A store holding a loaded project
    pub fn from_project(project: ProjectFile) -> Self {
        let mut store = Self::new(project.meta);
        store.load_pages(project.pages);
        store
    }

    /// Route future changes to a sync engine
    pub fn attach_sync(&mut self, handle: SyncHandle) {
        self.sync = Some(handle);
    }

    /// Stop routing changes; edits still apply in memory
    pub fn detach_sync(&mut self) -> Option<SyncHandle> {
        self.sync.take()
    }

    // ==================== Page Operations ====================

    /// Append a new empty page and make it active
    pub fn create_page(&mut self, title: &str) -> PageId {
        let page = Page::new(title);
        let id = page.id.clone();
        debug!(page = %id, "Creating page");

        self.pages.push(page);
        self.active = Some(id.clone());
        self.mark_pages_dirty();
        id
    }

    /// Select a page for editing
    ///
    /// Unknown ids are ignored. Returns the active id after the call.
    pub fn set_active_page(&mut self, id: &PageId) -> Option<&PageId> {
        if self.pages.iter().any(|p| &p.id == id) {
            self.active = Some(id.clone());
        } else {
            debug!(page = %id, "Ignoring selection of unknown page");
        }
        self.active.as_ref()
    }

    /// Replace the active page's content
    pub fn edit_active_page_content(&mut self, tree: NodeTree) -> Result<(), StoreError> {
        let page = self.active_page_mut()?;
        page.content = Some(tree);
        self.mark_pages_dirty();
        Ok(())
    }

    /// Replace the active page's title
    pub fn edit_active_page_title(&mut self, title: &str) -> Result<(), StoreError> {
        let page = self.active_page_mut()?;
        page.title = title.to_string();
        self.mark_pages_dirty();
        Ok(())
    }

    /// Replace the whole page collection
    ///
    /// Used when opening a project. Later pages that repeat an id already
    /// seen are dropped and logged. The first page becomes active. A fresh
    /// load is not a pending change, so the store ends up clean.
    pub fn load_pages(&mut self, pages: Vec<Page>) {
        let mut seen = HashSet::with_capacity(pages.len());
        let mut kept = Vec::with_capacity(pages.len());

        for (index, page) in pages.into_iter().enumerate() {
            if seen.insert(page.id.clone()) {
                kept.push(page);
            } else {
                warn!(page = %page.id, index, "Duplicate page id in loaded pages, dropping");
            }
        }

        self.active = kept.first().map(|p| p.id.clone());
        self.pages = kept;
        self.dirty = false;
        debug!(pages = self.pages.len(), "Loaded pages");
    }

    // ==================== Metadata ====================

    /// Replace the project metadata
    ///
    /// The identifier is fixed at creation; whatever `meta` carries there
    /// is ignored. Unknown keys loaded from the file carry over unless
    /// `meta` brings its own.
    pub fn set_metadata(&mut self, mut meta: Metadata) {
        meta.identifier = self.meta.identifier.clone();
        if meta.extra.is_empty() {
            meta.extra = std::mem::take(&mut self.meta.extra);
        }
        self.meta = meta;
        self.dirty = true;
        self.request_sync(ProjectPatch::meta(self.meta.clone()));
    }

    /// Apply the result of a successful write
    ///
    /// Picks up the new `modified` time. The store is clean again only if
    /// nothing changed since the written state was produced.
    pub fn acknowledge_sync(&mut self, written: &ProjectFile) {
        if written.meta.identifier != self.meta.identifier {
            warn!("Ignoring sync result for a different project");
            return;
        }

        let mut current = self.meta.clone();
        current.modified = written.meta.modified;
        let unchanged = current == written.meta && self.pages == written.pages;

        self.meta.modified = written.meta.modified;
        if unchanged {
            self.dirty = false;
        }
    }

    // ==================== Accessors ====================

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// Pages in reading order
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, id: &PageId) -> Option<&Page> {
        self.pages.iter().find(|p| &p.id == id)
    }

    pub fn active_page_id(&self) -> Option<&PageId> {
        self.active.as_ref()
    }

    pub fn active_page(&self) -> Option<&Page> {
        self.active.as_ref().and_then(|id| self.page(id))
    }

    /// Whether there are edits not yet confirmed written
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The full project as currently held in memory
    pub fn to_project_file(&self) -> ProjectFile {
        let mut file = ProjectFile::new(self.meta.clone());
        file.pages = self.pages.clone();
        file
    }

    // ==================== Internals ====================

    fn active_page_mut(&mut self) -> Result<&mut Page, StoreError> {
        let id = self.active.as_ref().ok_or(StoreError::NoActivePage)?;
        self.pages
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or(StoreError::NoActivePage)
    }

    fn mark_pages_dirty(&mut self) {
        self.dirty = true;
        self.request_sync(ProjectPatch::pages(self.pages.clone()));
    }

    fn request_sync(&self, patch: ProjectPatch) {
        if let Some(sync) = &self.sync {
            if !sync.request(patch) {
                warn!("Sync engine has stopped; change kept in memory only");
            }
        }
    }
}
