//! Listing and metadata types
//!
//! Shapes returned by the storage service to the routing layer. Timestamps
//! are epoch milliseconds throughout, matching the remote API.

use serde::Serialize;

pub use crate::path::Breadcrumb;

/// Whether a listing row is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// One row of a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileItem {
    /// Base name (no path components).
    pub name: String,
    /// File or folder.
    pub kind: EntryKind,
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// Last modified, epoch milliseconds (0 when unknown).
    pub modified: u64,
    /// Absolute `/`-rooted path within the bucket.
    pub path: String,
    /// MIME type, when known.
    pub content_type: Option<String>,
}

/// Response to a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListingResult {
    /// The `/`-rooted path that was listed.
    pub path: String,
    /// Entries sorted folders-first, then lexicographically by name.
    pub items: Vec<FileItem>,
    /// Navigation trail from the root to `path`.
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Accessibility result for one bucket.
#[derive(Debug, Clone, Serialize)]
pub struct BucketInfo {
    pub name: String,
    /// Whether this is the service's default bucket.
    pub is_default: bool,
    /// Whether the bucket answered a probe (or local storage is enabled).
    pub accessible: bool,
    /// When the probe ran, epoch milliseconds.
    pub last_validated: u64,
}

/// Stat-like descriptor for one object.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub content_type: String,
    pub content_length: u64,
    pub etag: String,
    /// Last modified, epoch milliseconds.
    pub last_modified: u64,
    /// Range reads are supported by both backends.
    pub accept_ranges: bool,
}

/// Current time as epoch milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
