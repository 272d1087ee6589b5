//! Merge-on-write
//!
//! A patch replaces whole top-level fields of the snapshot. A `pages` patch
//! swaps the entire page list; pages are not merged one by one.

use crate::models::{ProjectFile, ProjectPatch};

/// Build the record to write from the last written snapshot and a patch
///
/// Fields the patch doesn't carry come from the snapshot unchanged. The
/// identifier always stays the snapshot's. `modified` is stamped with the
/// current time.
pub fn merge(snapshot: &ProjectFile, patch: &ProjectPatch) -> ProjectFile {
    let mut merged = snapshot.clone();

    if let Some(meta) = &patch.meta {
        let identifier = std::mem::take(&mut merged.meta.identifier);
        merged.meta = meta.clone();
        merged.meta.identifier = identifier;
    }

    if let Some(pages) = &patch.pages {
        merged.pages = pages.clone();
    }

    merged.meta.touch();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, Page};
    use serde_json::json;

    fn snapshot() -> ProjectFile {
        let mut file = ProjectFile::new(Metadata::new("Book", "en"));
        file.pages = vec![Page::new("one"), Page::new("two")];
        file.extra.insert("theme".into(), json!("dark"));
        file
    }

    #[test]
    fn test_pages_patch_leaves_meta() {
        let base = snapshot();
        let new_pages = vec![Page::new("only")];

        let merged = merge(&base, &ProjectPatch::pages(new_pages.clone()));

        assert_eq!(merged.pages, new_pages);
        let mut meta = merged.meta.clone();
        meta.modified = base.meta.modified;
        assert_eq!(meta, base.meta);
        assert_eq!(merged.extra, base.extra);
    }

    #[test]
    fn test_meta_patch_leaves_pages() {
        let base = snapshot();
        let meta = Metadata::new("Renamed", "fr");

        let merged = merge(&base, &ProjectPatch::meta(meta));

        assert_eq!(merged.pages, base.pages);
        assert_eq!(merged.meta.title, "Renamed");
        assert_eq!(merged.meta.identifier, base.meta.identifier);
    }

    #[test]
    fn test_empty_patch_only_touches_modified() {
        let base = snapshot();
        let merged = merge(&base, &ProjectPatch::default());
        assert_eq!(merged.pages, base.pages);
        assert!(merged.meta.modified >= base.meta.modified);
    }
}
