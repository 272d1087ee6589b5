//! Export manifest
//!
//! The manifest is what packagers receive: the project metadata plus each
//! page's rendered markup, in reading order.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::render::{escape, render_page};
use crate::error::ValidationError;
use crate::models::{Metadata, Page, PageId};

/// One rendered page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPage {
    pub id: PageId,
    pub title: String,
    pub markup: String,
}

/// Everything a packager needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: Metadata,
    pub pages: Vec<ManifestPage>,
}

impl Manifest {
    /// Render every page of a project
    ///
    /// Uses only stored content, so it can run while editing continues.
    pub fn build(metadata: &Metadata, pages: &[Page]) -> Self {
        let pages = pages
            .iter()
            .map(|page| ManifestPage {
                id: page.id.clone(),
                title: page.title.clone(),
                markup: render_page(page),
            })
            .collect();

        Self {
            metadata: metadata.clone(),
            pages,
        }
    }

    /// Check what packaging needs: a title and at least one page
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.metadata.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.pages.is_empty() {
            return Err(ValidationError::NoPages);
        }
        Ok(())
    }

    /// Pages laid out as numbered XHTML chapter files
    pub fn chapters(&self) -> Vec<Chapter> {
        self.pages
            .iter()
            .enumerate()
            .map(|(idx, page)| {
                let title = if page.title.trim().is_empty() {
                    format!("Chapter {}", idx + 1)
                } else {
                    page.title.trim().to_string()
                };
                Chapter {
                    file_name: format!("{:02}-{}.xhtml", idx + 1, slug(&page.title)),
                    xhtml: wrap_as_xhtml(&title, &page.markup, &self.metadata.language),
                    title,
                }
            })
            .collect()
    }
}

/// A page as a standalone XHTML document
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub title: String,
    pub file_name: String,
    pub xhtml: String,
}

/// Lowercased runs of letters and digits joined by `-`
pub fn slug(s: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATORS
        .get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("slug pattern is valid"));

    let replaced = re.replace_all(s, "-");
    let trimmed = replaced.trim_matches('-');
    if trimmed.is_empty() {
        "page".to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Wrap a markup fragment in a complete XHTML document
pub fn wrap_as_xhtml(title: &str, fragment: &str, language: &str) -> String {
    let body = if fragment.trim().is_empty() {
        "&nbsp;"
    } else {
        fragment
    };
    let lang = if language.trim().is_empty() {
        "en".to_string()
    } else {
        escape(language.trim())
    };

    format!(
        r##"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}" lang="{lang}">
<head>
  <meta charset="utf-8" />
  <title>{title}</title>
</head>
<body>
{body}
</body>
</html>
"##,
        lang = lang,
        title = escape(title),
        body = body
    )
}
