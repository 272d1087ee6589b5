//! Open project sessions
//!
//! A `Session` ties together one project file, the store holding it, and
//! the sync engine writing it back. Everything that needs the open project
//! gets it from here.
//!
//! ## Usage
//!
//! ```ignore
//! let files: Arc<dyn ProjectFiles> = Arc::new(GzipProjectFiles::new());
//! let mut session = Session::open(files, &path, &config).await?;
//!
//! session.store_mut().create_page("Chapter one");
//! session.save().await?;
//! session.close().await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::document::CorruptNode;
use crate::error::{Error, Result};
use crate::export::{export_project, Packager};
use crate::models::ProjectFile;
use crate::project::{new_project_file, project_file_path, MetadataOptions};
use crate::storage::ProjectFiles;
use crate::store::Store;
use crate::sync::{spawn_sync_engine, SyncEvent, SyncHandle};

/// One open project
pub struct Session {
    path: PathBuf,
    store: Store,
    sync: SyncHandle,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    dropped_nodes: Vec<CorruptNode>,
}

impl Session {
    /// Create a new project named `name` in the configured projects directory
    pub async fn create(
        files: Arc<dyn ProjectFiles>,
        config: &Config,
        name: &str,
        mut options: MetadataOptions,
    ) -> Result<Self> {
        let path = project_file_path(&config.projects_dir, name)?;
        if options.creator.is_none() {
            options.creator = config.default_creator.clone();
        }
        let record = new_project_file(name, &config.default_language, options)?;

        files
            .create_project_file(&path, &record)
            .await
            .map_err(Error::WriteFailure)?;
        info!(path = %path.display(), "Created project");

        Ok(Self::start(files, path, record, config))
    }

    /// Open an existing project file
    pub async fn open(files: Arc<dyn ProjectFiles>, path: &Path, config: &Config) -> Result<Self> {
        let record = files
            .read_project_file(path)
            .await
            .map_err(Error::ReadFailure)?;
        info!(path = %path.display(), pages = record.pages.len(), "Opened project");
        if !record.dropped_nodes.is_empty() {
            warn!(
                path = %path.display(),
                dropped = record.dropped_nodes.len(),
                "Some page content could not be loaded"
            );
        }

        Ok(Self::start(files, path.to_path_buf(), record, config))
    }

    fn start(files: Arc<dyn ProjectFiles>, path: PathBuf, mut record: ProjectFile, config: &Config) -> Self {
        let dropped_nodes = std::mem::take(&mut record.dropped_nodes);
        let extra = std::mem::take(&mut record.extra);
        let mut store = Store::from_project(record);

        // Seed from the store so pages it dropped stay dropped on disk
        let mut snapshot = store.to_project_file();
        snapshot.extra = extra;
        let (sync, events) = spawn_sync_engine(files, path.clone(), snapshot, config.debounce());
        store.attach_sync(sync.clone());

        Self {
            path,
            store,
            sync,
            events,
            dropped_nodes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Content nodes that were dropped when the project was opened
    pub fn dropped_nodes(&self) -> &[CorruptNode] {
        &self.dropped_nodes
    }

    /// The dropped nodes as recoverable errors
    pub fn load_errors(&self) -> Vec<Error> {
        self.dropped_nodes.iter().cloned().map(Error::CorruptNode).collect()
    }

    /// Apply finished writes to the store and return what happened
    ///
    /// Never waits; call it whenever convenient (e.g. once per UI tick).
    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match &event {
                SyncEvent::Written(file) => self.store.acknowledge_sync(file),
                SyncEvent::Failed { message, .. } => warn!(error = %message, "Autosave failed"),
                SyncEvent::StateChanged(_) => {}
            }
            seen.push(event);
        }
        seen
    }

    /// Write pending changes now
    pub async fn save(&mut self) -> Result<()> {
        self.poll_events();
        if let Some(written) = self.sync.flush().await? {
            self.store.acknowledge_sync(&written);
        }
        Ok(())
    }

    /// Export the stored pages through `packager`
    ///
    /// Reads the store as it is; pending writes don't need to finish first.
    pub async fn export(&self, packager: &dyn Packager, output: &Path) -> Result<PathBuf> {
        let path = export_project(self.store.metadata(), self.store.pages(), packager, output).await?;
        Ok(path)
    }

    /// Write pending changes and stop the sync engine
    pub async fn close(mut self) -> Result<()> {
        self.store.detach_sync();
        let result = self.sync.shutdown().await;
        self.poll_events();
        if let Ok(Some(written)) = &result {
            self.store.acknowledge_sync(written);
        }
        info!(path = %self.path.display(), "Closed project");
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, Page, PageId};
    use crate::storage::{StorageError, StorageResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Project files kept in a map
    #[derive(Default)]
    struct MemoryFiles {
        files: Mutex<HashMap<PathBuf, ProjectFile>>,
    }

    #[async_trait]
    impl ProjectFiles for MemoryFiles {
        async fn read_project_file(&self, path: &Path) -> StorageResult<ProjectFile> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| StorageError::NotFound {
                    path: path.to_path_buf(),
                })
        }

        async fn write_project_file(&self, path: &Path, record: &ProjectFile) -> StorageResult<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), record.clone());
            Ok(())
        }

        async fn create_project_file(&self, path: &Path, initial: &ProjectFile) -> StorageResult<()> {
            let mut files = self.files.lock().unwrap();
            if files.contains_key(path) {
                return Err(StorageError::AlreadyExists {
                    path: path.to_path_buf(),
                });
            }
            files.insert(path.to_path_buf(), initial.clone());
            Ok(())
        }
    }

    fn config() -> Config {
        Config {
            projects_dir: PathBuf::from("/books"),
            default_creator: Some("Ada".into()),
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_then_reopen() {
        let files = Arc::new(MemoryFiles::default());
        let config = config();

        let mut session = Session::create(files.clone(), &config, "Novel", MetadataOptions::default())
            .await
            .unwrap();
        assert_eq!(session.path(), Path::new("/books/Novel.ketabi"));
        assert_eq!(session.store().metadata().creator.as_ref().unwrap().name, "Ada");

        session.store_mut().create_page("One");
        session.save().await.unwrap();
        assert!(!session.store().is_dirty());
        session.close().await.unwrap();

        let reopened = Session::open(files, Path::new("/books/Novel.ketabi"), &config)
            .await
            .unwrap();
        assert_eq!(reopened.store().pages().len(), 1);
        assert_eq!(reopened.store().active_page().unwrap().title, "One");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_bad_name() {
        let files = Arc::new(MemoryFiles::default());
        let err = Session::create(files, &config(), "   ", MetadataOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_existing_is_write_failure() {
        let files = Arc::new(MemoryFiles::default());
        let config = config();
        let first = Session::create(files.clone(), &config, "Dup", MetadataOptions::default())
            .await
            .unwrap();
        first.close().await.unwrap();

        let err = Session::create(files, &config, "Dup", MetadataOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::WriteFailure(StorageError::AlreadyExists { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_missing_is_read_failure() {
        let files = Arc::new(MemoryFiles::default());
        let err = Session::open(files, Path::new("/none.ketabi"), &config())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ReadFailure(StorageError::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_is_acknowledged() {
        let files = Arc::new(MemoryFiles::default());
        let mut session = Session::create(files.clone(), &config(), "Auto", MetadataOptions::default())
            .await
            .unwrap();

        session.store_mut().set_metadata(Metadata::new("Auto, revised", "en"));
        assert!(session.store().is_dirty());

        tokio::time::sleep(config().debounce() * 2).await;
        let events = session.poll_events();
        assert!(events.iter().any(|e| matches!(e, SyncEvent::Written(_))));
        assert!(!session.store().is_dirty());

        let stored = files
            .read_project_file(Path::new("/books/Auto.ketabi"))
            .await
            .unwrap();
        assert_eq!(stored.meta.title, "Auto, revised");
        assert_eq!(stored.meta.identifier, session.store().metadata().identifier);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_pages_stay_dropped_after_write() {
        let files = Arc::new(MemoryFiles::default());
        let path = PathBuf::from("/books/Dupes.ketabi");
        let mut record = ProjectFile::new(Metadata::new("Dupes", "en"));
        record.pages = vec![
            Page::with_id(PageId::from("p1"), "First"),
            Page::with_id(PageId::from("p1"), "Second"),
        ];
        record.extra.insert("app".into(), serde_json::json!("kept"));
        files.write_project_file(&path, &record).await.unwrap();

        let mut session = Session::open(files.clone(), &path, &config()).await.unwrap();
        assert_eq!(session.store().pages().len(), 1);

        // A metadata-only write must not bring the duplicate back
        session.store_mut().set_metadata(Metadata::new("Dupes, revised", "en"));
        session.save().await.unwrap();
        assert!(!session.store().is_dirty());

        let stored = files.read_project_file(&path).await.unwrap();
        assert_eq!(stored.pages.len(), 1);
        assert_eq!(stored.pages[0].title, "First");
        assert_eq!(stored.meta.title, "Dupes, revised");
        assert_eq!(stored.extra.get("app"), Some(&serde_json::json!("kept")));
    }
}
