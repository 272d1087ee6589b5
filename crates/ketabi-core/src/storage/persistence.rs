//! Project file persistence
//!
//! Handles reading and writing `.ketabi` project files. The rest of the
//! crate only sees the [`ProjectFiles`] trait, so tests and embedders can
//! swap in their own bridge.
//!
//! Uses atomic writes (write to temp file, then rename) to prevent corruption.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tracing::debug;

use super::error::{StorageError, StorageResult};
use crate::models::ProjectFile;
use crate::project::is_project_file;

/// File-system bridge for project files
#[async_trait]
pub trait ProjectFiles: Send + Sync {
    /// Read and parse a project file
    async fn read_project_file(&self, path: &Path) -> StorageResult<ProjectFile>;

    /// Replace the contents of an existing project file
    async fn write_project_file(&self, path: &Path, record: &ProjectFile) -> StorageResult<()>;

    /// Create a new project file; fails if one already exists
    async fn create_project_file(&self, path: &Path, initial: &ProjectFile) -> StorageResult<()>;
}

/// The on-disk bridge: gzip-compressed JSON
#[derive(Debug, Clone)]
pub struct GzipProjectFiles {
    level: Compression,
}

impl Default for GzipProjectFiles {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipProjectFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific gzip level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Serialize and compress a record
    pub fn encode(&self, record: &ProjectFile, path: &Path) -> StorageResult<Vec<u8>> {
        let json = serde_json::to_vec(record).map_err(|e| StorageError::InvalidFormat {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;

        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(&json)
            .map_err(|e| StorageError::from_io(e, path.to_path_buf()))?;
        encoder
            .finish()
            .map_err(|e| StorageError::from_io(e, path.to_path_buf()))
    }

    /// Decompress and parse a record
    pub fn decode(bytes: &[u8], path: &Path) -> StorageResult<ProjectFile> {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| StorageError::InvalidFormat {
                path: path.to_path_buf(),
                details: format!("not a gzip stream: {}", e),
            })?;

        let invalid = |e: serde_json::Error| StorageError::InvalidFormat {
            path: path.to_path_buf(),
            details: e.to_string(),
        };
        let value: Value = serde_json::from_slice(&json).map_err(invalid)?;
        ProjectFile::from_value(value).map_err(invalid)
    }

    fn read_blocking(path: &Path) -> StorageResult<ProjectFile> {
        let bytes = fs::read(path).map_err(|e| StorageError::from_read_io(e, path.to_path_buf()))?;
        Self::decode(&bytes, path)
    }

    fn write_blocking(&self, path: &Path, record: &ProjectFile) -> StorageResult<()> {
        let bytes = self.encode(record, path)?;
        atomic_write(path, &bytes)
    }
}

#[async_trait]
impl ProjectFiles for GzipProjectFiles {
    async fn read_project_file(&self, path: &Path) -> StorageResult<ProjectFile> {
        check_extension(path)?;
        let path = path.to_path_buf();
        let record = run_blocking(move || Self::read_blocking(&path)).await?;
        debug!(pages = record.pages.len(), "Read project file");
        Ok(record)
    }

    async fn write_project_file(&self, path: &Path, record: &ProjectFile) -> StorageResult<()> {
        check_extension(path)?;
        let this = self.clone();
        let target = path.to_path_buf();
        let record = record.clone();
        run_blocking(move || this.write_blocking(&target, &record)).await?;
        debug!(path = %path.display(), "Wrote project file");
        Ok(())
    }

    async fn create_project_file(&self, path: &Path, initial: &ProjectFile) -> StorageResult<()> {
        check_extension(path)?;
        if path.exists() {
            return Err(StorageError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        self.write_project_file(path, initial).await
    }
}

/// Run file work off the async runtime
async fn run_blocking<T, F>(f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
}

fn check_extension(path: &Path) -> StorageResult<()> {
    if is_project_file(path) {
        Ok(())
    } else {
        Err(StorageError::InvalidExtension {
            path: path.to_path_buf(),
        })
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
pub fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    // Create temp file in the same directory (for atomic rename)
    let temp_path = temp_path_for(path);

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    // Sync to disk before rename
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::AtomicWriteFailed {
            from: temp_path.clone(),
            to: path.to_path_buf(),
            source: e,
        }
    })?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Node, NodeTree};
    use crate::models::{Metadata, Page};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_project() -> ProjectFile {
        let mut file = ProjectFile::new(Metadata::new("Book", "en"));
        let mut page = Page::new("One");
        page.content = Some(NodeTree::with_children(vec![Node::paragraph("hello")]));
        file.pages.push(page);
        file.pages.push(Page::new("Two"));
        file
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("book.ketabi");
        let files = GzipProjectFiles::new();

        let project = sample_project();
        files.create_project_file(&path, &project).await.unwrap();
        assert!(path.exists());

        let loaded = files.read_project_file(&path).await.unwrap();
        assert_eq!(loaded, project);
    }

    #[tokio::test]
    async fn test_create_refuses_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("book.ketabi");
        let files = GzipProjectFiles::new();

        files.create_project_file(&path, &sample_project()).await.unwrap();
        let err = files
            .create_project_file(&path, &sample_project())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_write_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("book.ketabi");
        let files = GzipProjectFiles::new();

        let mut project = sample_project();
        files.create_project_file(&path, &project).await.unwrap();

        project.pages.truncate(1);
        project.pages[0].title = "Renamed".into();
        files.write_project_file(&path, &project).await.unwrap();

        let loaded = files.read_project_file(&path).await.unwrap();
        assert_eq!(loaded.pages.len(), 1);
        assert_eq!(loaded.pages[0].title, "Renamed");
        assert!(!temp_dir.path().join("book.ketabi.tmp").exists());
    }

    #[tokio::test]
    async fn test_rejects_wrong_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("book.json");
        let files = GzipProjectFiles::new();

        let err = files
            .create_project_file(&path, &sample_project())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidExtension { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let files = GzipProjectFiles::new();

        let err = files
            .read_project_file(&temp_dir.path().join("nope.ketabi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_plain_json_is_invalid_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.ketabi");
        fs::write(&path, br#"{"meta":{},"pages":[]}"#).unwrap();

        let err = GzipProjectFiles::new()
            .read_project_file(&path)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidFormat { .. }));
    }

    #[tokio::test]
    async fn test_unknown_top_level_keys_survive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("extra.ketabi");

        let raw = json!({
            "meta": {
                "identifier": "urn:uuid:fixed",
                "title": "Book",
                "language": "en",
                "modified": "2025-01-01T00:00:00Z"
            },
            "pages": [],
            "bookmarks": [1, 2, 3]
        });
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw.to_string().as_bytes()).unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let files = GzipProjectFiles::new();
        let loaded = files.read_project_file(&path).await.unwrap();
        files.write_project_file(&path, &loaded).await.unwrap();

        let reloaded = files.read_project_file(&path).await.unwrap();
        assert_eq!(reloaded.extra.get("bookmarks"), Some(&json!([1, 2, 3])));
        assert_eq!(reloaded.meta.identifier, "urn:uuid:fixed");
    }

    #[test]
    fn test_encode_is_gzip() {
        let bytes = GzipProjectFiles::with_level(9)
            .encode(&sample_project(), Path::new("x.ketabi"))
            .unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir
            .path()
            .join("a")
            .join("b")
            .join("c")
            .join("file.txt");

        atomic_write(&nested_path, b"test data").unwrap();

        assert!(nested_path.exists());
        let content = fs::read_to_string(&nested_path).unwrap();
        assert_eq!(content, "test data");
    }
}
