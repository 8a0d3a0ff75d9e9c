//! Storage client capability interface
//!
//! Both the remote object-storage client and the local filesystem adapter
//! implement [`ObjectClient`]. The service resolves which variant to use once
//! per bucket, at pool-entry creation, and dispatches through the trait from
//! then on.

mod local;
mod remote;

pub use local::LocalClient;
pub use remote::RemoteClient;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Which backend variant a client handle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Remote,
    Local,
}

/// Parameters for a listing call.
#[derive(Debug, Clone)]
pub struct ListRequest {
    /// Key prefix to list under (empty for the bucket root).
    pub prefix: String,
    /// Delimiter for directory-style listing; `None` recurses fully.
    pub delimiter: Option<char>,
    /// Maximum number of entries to return.
    pub max_keys: usize,
}

/// One content entry in a listing.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Full key relative to the bucket root.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modified, epoch milliseconds.
    pub last_modified: u64,
}

/// Result of a listing call.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Direct content entries under the prefix.
    pub contents: Vec<ObjectEntry>,
    /// Delimiter-terminated sub-prefixes (folder markers).
    pub common_prefixes: Vec<String>,
}

/// Stat result for one object.
#[derive(Debug, Clone)]
pub struct ObjectStat {
    pub content_type: String,
    pub size: u64,
    pub etag: String,
    /// Last modified, epoch milliseconds.
    pub last_modified: u64,
}

/// Capability surface required from a storage backend.
///
/// Byte ranges are inclusive on both ends, HTTP `Range` style.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Backend variant of this handle.
    fn kind(&self) -> ClientKind;

    /// Bucket this handle is bound to.
    fn bucket(&self) -> &str;

    /// List keys under a prefix.
    async fn list(&self, request: &ListRequest) -> Result<Listing>;

    /// Write an object, creating intermediate structure as needed.
    async fn write(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Delete an object, or an entire subtree when `key` ends with `/`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Produce a time-limited retrieval URL for an object.
    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String>;

    /// Stat an object.
    async fn stat(&self, key: &str) -> Result<ObjectStat>;

    /// Read an entire object.
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Read an inclusive byte range of an object.
    async fn read_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes>;
}
