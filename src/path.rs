//! Path validation and normalization
//!
//! All public operations receive `/`-rooted path strings. Validation runs
//! before any I/O or cache access; keys handed to clients are bucket-relative
//! with `/` as the canonical separator on every host OS.

use serde::Serialize;

use crate::error::{Result, StorageError};

/// Canonical path separator for object keys.
pub const SEPARATOR: char = '/';

/// Validate a caller-supplied path.
///
/// Rejects empty paths, parent traversal (`..`), repeated separators, and
/// characters outside `[A-Za-z0-9-_/.]`.
pub fn validate(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(StorageError::InvalidPath("empty path".to_string()));
    }
    if path.contains("..") {
        return Err(StorageError::InvalidPath(format!(
            "parent traversal not allowed: {}",
            path
        )));
    }
    if path.contains("//") {
        return Err(StorageError::InvalidPath(format!(
            "repeated separators not allowed: {}",
            path
        )));
    }
    if let Some(bad) = path
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.')))
    {
        return Err(StorageError::InvalidPath(format!(
            "illegal character {:?} in path: {}",
            bad, path
        )));
    }
    Ok(())
}

/// Validate a bucket name (same character rules, no separators at all).
pub fn validate_bucket(name: &str) -> Result<()> {
    validate(name)?;
    if name.contains(SEPARATOR) {
        return Err(StorageError::InvalidPath(format!(
            "bucket name must not contain separators: {}",
            name
        )));
    }
    Ok(())
}

/// Convert a `/`-rooted path to a bucket-relative object key.
///
/// `"/docs/report.pdf"` becomes `"docs/report.pdf"`; the root maps to `""`.
pub fn to_key(path: &str) -> String {
    path.trim_matches(SEPARATOR).to_string()
}

/// Compute the delimiter-terminated listing prefix for a directory path.
///
/// The root yields the empty prefix; `"/photos"` yields `"photos/"`.
pub fn listing_prefix(path: &str) -> String {
    let key = to_key(path);
    if key.is_empty() {
        String::new()
    } else {
        format!("{}{}", key, SEPARATOR)
    }
}

/// Compute the parent directory of a `/`-rooted path.
///
/// Strips a trailing separator, then everything after the last remaining
/// separator; paths at the top level parent to `"/"`.
pub fn parent(path: &str) -> String {
    let trimmed = path.trim_end_matches(SEPARATOR);
    match trimmed.rfind(SEPARATOR) {
        Some(0) | None => SEPARATOR.to_string(),
        Some(idx) => trimmed[..idx].to_string(),
    }
}

/// Breadcrumb element: display name plus the `/`-rooted path it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

/// Build breadcrumbs for a listing prefix by accumulating partial paths.
///
/// `"photos/2024/"` yields `[("photos", "/photos"), ("2024", "/photos/2024")]`.
pub fn breadcrumbs(prefix: &str) -> Vec<Breadcrumb> {
    let cleaned = prefix.trim_matches(SEPARATOR);
    if cleaned.is_empty() {
        return Vec::new();
    }
    let mut crumbs = Vec::new();
    let mut accumulated = String::new();
    for segment in cleaned.split(SEPARATOR) {
        accumulated.push(SEPARATOR);
        accumulated.push_str(segment);
        crumbs.push(Breadcrumb {
            name: segment.to_string(),
            path: accumulated.clone(),
        });
    }
    crumbs
}
