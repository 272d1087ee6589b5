//! Data models for Ketabi
//!
//! Defines the persisted project record: metadata plus an ordered list of
//! pages. Unknown keys at the top level, in metadata, and on pages are kept
//! in `extra` so a load/save cycle doesn't lose them.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::document::{CorruptNode, NodeTree};

/// Opaque page identifier, generated once and never reused
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One page of the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    /// May be empty; see [`Page::display_title`]
    #[serde(default)]
    pub title: String,
    /// Absent means an empty page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<NodeTree>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Page {
    /// Create an empty page with a fresh id
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(PageId::new(), title)
    }

    /// Create a page with a specific id (for loading from storage)
    pub fn with_id(id: PageId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: None,
            extra: Map::new(),
        }
    }

    /// Title for display; an empty title shows as "Untitled"
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }
}

/// Author/creator of the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Project metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// `urn:uuid:...`; fixed once generated
    #[serde(default = "generate_identifier")]
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    /// Language code, e.g. `en`
    #[serde(default)]
    pub language: String,
    /// Last successful sync, UTC, whole seconds
    #[serde(default = "now_seconds", with = "modified_format")]
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Creator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    /// New metadata with a fresh identifier and `modified` set to now
    pub fn new(title: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            identifier: generate_identifier(),
            title: title.into(),
            language: language.into(),
            modified: now_seconds(),
            creator: None,
            publisher: None,
            date: None,
            subject: None,
            description: None,
            cover: None,
            extra: Map::new(),
        }
    }

    /// Stamp `modified` with the current time
    pub fn touch(&mut self) {
        self.modified = now_seconds();
    }
}

/// A fresh `urn:uuid:` identifier
pub fn generate_identifier() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// Current UTC time truncated to whole seconds
pub fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `modified` is written as `2025-01-02T03:04:05Z`
mod modified_format {
    use chrono::{DateTime, SecondsFormat, Timelike, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        let parsed = DateTime::parse_from_rfc3339(&raw)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        Ok(parsed.with_nanosecond(0).unwrap_or(parsed))
    }
}

/// The whole persisted project: exactly `meta` and `pages`, plus whatever
/// unknown keys the file already had
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub meta: Metadata,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Content nodes dropped while this record was decoded; never stored
    #[serde(skip)]
    pub dropped_nodes: Vec<CorruptNode>,
}

impl ProjectFile {
    /// An empty project around the given metadata
    pub fn new(meta: Metadata) -> Self {
        Self {
            meta,
            pages: Vec::new(),
            extra: Map::new(),
            dropped_nodes: Vec::new(),
        }
    }

    /// Decode a stored record, keeping a diagnostic for every dropped node
    ///
    /// Diagnostic paths are rooted at the record, e.g.
    /// `/pages/0/content/root/children/1`.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let mut dropped = Vec::new();
        if let Some(pages) = value.get("pages").and_then(Value::as_array) {
            for (index, page) in pages.iter().enumerate() {
                let Some(content) = page.get("content").filter(|c| !c.is_null()) else {
                    continue;
                };
                dropped.extend(NodeTree::decode(content).diagnostics.into_iter().map(|node| {
                    CorruptNode {
                        path: format!("/pages/{}/content{}", index, node.path),
                        reason: node.reason,
                    }
                }));
            }
        }

        let mut record: ProjectFile = serde_json::from_value(value)?;
        record.dropped_nodes = dropped;
        Ok(record)
    }

    /// `modified` formatted the way it is stored
    pub fn modified_string(&self) -> String {
        self.meta
            .modified
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// A partial update to a project: only the fields that changed
///
/// Serializes to `{ "pages": [...] }`, `{ "meta": {...} }` or both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<Page>>,
}

impl ProjectPatch {
    /// Replace the whole page list
    pub fn pages(pages: Vec<Page>) -> Self {
        Self {
            meta: None,
            pages: Some(pages),
        }
    }

    /// Replace the metadata
    pub fn meta(meta: Metadata) -> Self {
        Self {
            meta: Some(meta),
            pages: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_none() && self.pages.is_none()
    }

    /// Fold a later patch into this one: union of keys, later value wins
    pub fn absorb(&mut self, later: ProjectPatch) {
        if later.meta.is_some() {
            self.meta = later.meta;
        }
        if later.pages.is_some() {
            self.pages = later.pages;
        }
    }

    /// Names of the fields this patch carries, for logging
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.meta.is_some() {
            keys.push("meta");
        }
        if self.pages.is_some() {
            keys.push("pages");
        }
        keys
    }
}
