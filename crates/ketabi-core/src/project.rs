//! Project naming and creation helpers
//!
//! A project lives in a single `<name>.ketabi` file. These helpers validate
//! the name a user typed and build the initial record written on creation.

use std::path::{Path, PathBuf};

use crate::error::ValidationError;
use crate::models::{Creator, Metadata, ProjectFile};

/// Extension of project files, without the dot
pub const PROJECT_EXTENSION: &str = "ketabi";

/// Longest accepted project name, in characters
pub const MAX_PROJECT_NAME_LEN: usize = 100;

/// Validate a project name and return it trimmed
///
/// The name becomes a file name inside the projects directory, so path
/// separators, control characters and the names `.` and `..` are rejected.
pub fn validate_project_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyProjectName);
    }

    if trimmed == "." || trimmed == ".." {
        return Err(ValidationError::MalformedProjectName {
            name: trimmed.to_string(),
            reason: "not a file name".to_string(),
        });
    }
    if let Some(c) = trimmed.chars().find(|&c| matches!(c, '/' | '\\') || c.is_control()) {
        return Err(ValidationError::MalformedProjectName {
            name: trimmed.to_string(),
            reason: format!("contains {:?}", c),
        });
    }

    let len = trimmed.chars().count();
    if len > MAX_PROJECT_NAME_LEN {
        return Err(ValidationError::ProjectNameTooLong {
            len,
            max: MAX_PROJECT_NAME_LEN,
        });
    }

    Ok(trimmed.to_string())
}

/// Optional fields filled in when a project is created
#[derive(Debug, Clone, Default)]
pub struct MetadataOptions {
    pub creator: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
}

/// Build metadata for a new project
///
/// Blank optional fields are left out rather than stored as empty strings.
pub fn generate_metadata(title: &str, language: &str, options: MetadataOptions) -> Metadata {
    let mut meta = Metadata::new(title.trim(), language.trim());
    meta.creator = non_blank(options.creator).map(|name| Creator { name, role: None });
    meta.publisher = non_blank(options.publisher);
    meta.description = non_blank(options.description);
    meta
}

/// Initial record for a new project: metadata and no pages
pub fn new_project_file(name: &str, language: &str, options: MetadataOptions) -> Result<ProjectFile, ValidationError> {
    let name = validate_project_name(name)?;
    Ok(ProjectFile::new(generate_metadata(&name, language, options)))
}

/// Path of the project file for `name` inside `dir`
pub fn project_file_path(dir: &Path, name: &str) -> Result<PathBuf, ValidationError> {
    let name = validate_project_name(name)?;
    Ok(dir.join(format!("{}.{}", name, PROJECT_EXTENSION)))
}

/// Whether `path` names a project file
pub fn is_project_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PROJECT_EXTENSION))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
