//! Packaging collaborators
//!
//! A packager turns a manifest into files on disk. Archive formats live
//! outside this crate behind the [`Packager`] trait; the crate ships one
//! packager that writes loose XHTML chapters into a directory.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use super::manifest::Manifest;
use crate::error::ValidationError;
use crate::storage::atomic_write;

/// Errors that can occur while exporting
#[derive(Error, Debug)]
pub enum ExportError {
    /// The manifest can't be packaged as-is
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The manifest couldn't be encoded or decoded
    #[error("Failed to encode manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The packager reported a failure
    #[error("Packaging failed: {0}")]
    Packaging(String),
}

/// Turns a manifest JSON document into output at a chosen path
#[async_trait]
pub trait Packager: Send + Sync {
    /// Package `manifest_json` at `output`; returns the path written
    async fn package_export(&self, manifest_json: &str, output: &Path) -> Result<PathBuf, ExportError>;
}

/// Writes `manifest.json` and one XHTML file per chapter into a directory
#[derive(Debug, Clone, Default)]
pub struct XhtmlDirectoryPackager;

impl XhtmlDirectoryPackager {
    pub fn new() -> Self {
        Self
    }

    fn write_all(manifest_json: &str, manifest: &Manifest, output: &Path) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(output).map_err(|e| {
            ExportError::Packaging(format!("cannot create '{}': {}", output.display(), e))
        })?;

        atomic_write(&output.join("manifest.json"), manifest_json.as_bytes())
            .map_err(|e| ExportError::Packaging(e.to_string()))?;

        for chapter in manifest.chapters() {
            atomic_write(&output.join(&chapter.file_name), chapter.xhtml.as_bytes())
                .map_err(|e| ExportError::Packaging(e.to_string()))?;
        }

        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl Packager for XhtmlDirectoryPackager {
    async fn package_export(&self, manifest_json: &str, output: &Path) -> Result<PathBuf, ExportError> {
        let manifest: Manifest = serde_json::from_str(manifest_json)?;
        manifest.validate()?;

        let json = manifest_json.to_string();
        let dir = output.to_path_buf();
        let written = tokio::task::spawn_blocking(move || Self::write_all(&json, &manifest, &dir))
            .await
            .map_err(|e| ExportError::Packaging(e.to_string()))??;

        info!(path = %written.display(), "Exported project");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Node, NodeTree};
    use crate::models::{Metadata, Page};
    use tempfile::TempDir;

    fn manifest_json() -> String {
        let mut page = Page::new("Opening");
        page.content = Some(NodeTree::with_children(vec![Node::paragraph("Once")]));
        let manifest = Manifest::build(&Metadata::new("Book", "en"), &[page, Page::new("")]);
        serde_json::to_string(&manifest).unwrap()
    }

    #[tokio::test]
    async fn test_writes_chapters() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("export");

        let written = XhtmlDirectoryPackager::new()
            .package_export(&manifest_json(), &out)
            .await
            .unwrap();

        assert_eq!(written, out);
        assert!(out.join("manifest.json").exists());
        let first = fs::read_to_string(out.join("01-opening.xhtml")).unwrap();
        assert!(first.contains("<p>Once</p>"));
        assert!(out.join("02-page.xhtml").exists());
    }

    #[tokio::test]
    async fn test_rejects_manifest_without_pages() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = Manifest::build(&Metadata::new("Book", "en"), &[]);
        let json = serde_json::to_string(&manifest).unwrap();

        let err = XhtmlDirectoryPackager::new()
            .package_export(&json, temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Validation(ValidationError::NoPages)));
    }

    #[tokio::test]
    async fn test_rejects_malformed_json() {
        let temp_dir = TempDir::new().unwrap();
        let err = XhtmlDirectoryPackager::new()
            .package_export("{not json", temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Serialize(_)));
    }
}
