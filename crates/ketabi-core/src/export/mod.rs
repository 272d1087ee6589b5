//! Export transformer
//!
//! Converts stored pages to markup, assembles the manifest, and hands it to
//! a [`Packager`]. The transformer never writes the final archive itself.

pub mod manifest;
pub mod packager;
pub mod render;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::{Metadata, Page};

pub use manifest::{slug, wrap_as_xhtml, Chapter, Manifest, ManifestPage};
pub use packager::{ExportError, Packager, XhtmlDirectoryPackager};
pub use render::{render_page, render_tree};

/// Render, validate and package a project
pub async fn export_project(
    metadata: &Metadata,
    pages: &[Page],
    packager: &dyn Packager,
    output: &Path,
) -> Result<PathBuf, ExportError> {
    let manifest = Manifest::build(metadata, pages);
    manifest.validate()?;

    let json = serde_json::to_string(&manifest)?;
    debug!(pages = manifest.pages.len(), bytes = json.len(), "Packaging manifest");
    packager.package_export(&json, output).await
}
