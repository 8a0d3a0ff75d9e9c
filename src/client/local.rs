//! Local filesystem storage adapter
//!
//! Implements the same capability surface as the remote client, backed by a
//! directory tree rooted at `base_path/bucket/`. Keys use `/` separators on
//! every host OS and may never escape the bucket root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, trace};

use super::{ClientKind, ListRequest, Listing, ObjectClient, ObjectEntry, ObjectStat};
use crate::error::{Result, StorageError};
use crate::path::SEPARATOR;

/// URL prefix under which the application serves local-bucket files.
const LOCAL_SERVE_PREFIX: &str = "/local-files";

/// Fallback MIME type when the extension is unknown.
const OCTET_STREAM: &str = "application/octet-stream";

/// Filesystem-backed storage client for one bucket.
pub struct LocalClient {
    bucket: String,
    root: PathBuf,
}

impl LocalClient {
    /// Create a client rooted at `base_path/bucket/`, creating the directory
    /// if it does not exist yet.
    pub async fn new(base_path: &Path, bucket: &str) -> Result<Self> {
        let root = base_path.join(bucket);
        fs::create_dir_all(&root).await?;
        debug!(bucket = bucket, root = %root.display(), "local storage client ready");
        Ok(Self {
            bucket: bucket.to_string(),
            root,
        })
    }

    /// Resolve a key to a path under the bucket root.
    ///
    /// Keys are rejoined component by component so the bucket root is an
    /// inescapable boundary regardless of the host separator convention.
    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for component in key.split(SEPARATOR) {
            if component.is_empty() {
                continue;
            }
            if component == ".." || component == "." {
                return Err(StorageError::InvalidPath(format!(
                    "key escapes bucket root: {}",
                    key
                )));
            }
            path.push(component);
        }
        Ok(path)
    }

    /// Convert an absolute path back to a `/`-separated bucket-relative key.
    fn path_to_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    /// List only the immediate children of the prefix directory.
    async fn list_shallow(&self, prefix: &str, max_keys: usize) -> Result<Listing> {
        let dir = self.key_to_path(prefix.trim_end_matches(SEPARATOR))?;
        let mut listing = Listing::default();

        if !dir.is_dir() {
            return Ok(listing);
        }

        let mut entries = fs::read_dir(&dir).await?;
        let mut count = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if count >= max_keys {
                break;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                listing.common_prefixes.push(format!("{}{}/", prefix, name));
            } else {
                let meta = entry.metadata().await?;
                listing.contents.push(ObjectEntry {
                    key: format!("{}{}", prefix, name),
                    size: meta.len(),
                    last_modified: modified_millis(&meta),
                });
            }
            count += 1;
        }

        listing.common_prefixes.sort();
        listing.contents.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listing)
    }

    /// Recurse fully and return every file under the prefix as a flat key.
    async fn list_recursive(&self, prefix: &str, max_keys: usize) -> Result<Listing> {
        let base = self.key_to_path(prefix.trim_end_matches(SEPARATOR))?;
        let mut listing = Listing::default();

        if !base.exists() {
            return Ok(listing);
        }

        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            if listing.contents.len() >= max_keys {
                break;
            }
            if dir.is_file() {
                if let Some(key) = self.path_to_key(&dir) {
                    let meta = fs::metadata(&dir).await?;
                    listing.contents.push(ObjectEntry {
                        key,
                        size: meta.len(),
                        last_modified: modified_millis(&meta),
                    });
                }
                continue;
            }
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if listing.contents.len() < max_keys {
                    if let Some(key) = self.path_to_key(&path) {
                        let meta = entry.metadata().await?;
                        listing.contents.push(ObjectEntry {
                            key,
                            size: meta.len(),
                            last_modified: modified_millis(&meta),
                        });
                    }
                }
            }
        }

        listing.contents.sort_by(|a, b| a.key.cmp(&b.key));
        listing.contents.truncate(max_keys);
        Ok(listing)
    }
}

fn modified_millis(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Synthesize an ETag from mtime and size.
///
/// Not a content hash; good enough for change detection on a local tree.
fn synthetic_etag(modified: u64, size: u64) -> String {
    format!("{:x}-{:x}", modified, size)
}

fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

#[async_trait]
impl ObjectClient for LocalClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Local
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, request: &ListRequest) -> Result<Listing> {
        trace!(
            bucket = %self.bucket,
            prefix = %request.prefix,
            delimiter = ?request.delimiter,
            "local list"
        );
        if request.delimiter.is_some() {
            self.list_shallow(&request.prefix, request.max_keys).await
        } else {
            self.list_recursive(&request.prefix, request.max_keys).await
        }
    }

    async fn write(&self, key: &str, data: Bytes, _content_type: &str) -> Result<()> {
        let path = self.key_to_path(key)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent).await?;

        // Write to a uniquely-named temp file in the target directory, then
        // rename into place. Readers never observe a partial object and
        // concurrent writers each hold their own temp file.
        let tmp = tempfile::NamedTempFile::new_in(&parent)?;
        fs::write(tmp.path(), &data).await?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        debug!(bucket = %self.bucket, key = key, size = data.len(), "wrote local object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if key.ends_with(SEPARATOR) {
            let path = self.key_to_path(key.trim_end_matches(SEPARATOR))?;
            fs::remove_dir_all(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Io(e)
                }
            })?;
            debug!(bucket = %self.bucket, key = key, "removed local directory tree");
        } else {
            let path = self.key_to_path(key)?;
            fs::remove_file(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Io(e)
                }
            })?;
            debug!(bucket = %self.bucket, key = key, "removed local object");
        }
        Ok(())
    }

    async fn presign(&self, key: &str, _expires_in: Duration) -> Result<String> {
        // No signed-URL concept on a filesystem; the serving route is
        // deterministic.
        self.key_to_path(key)?;
        Ok(format!("{}/{}/{}", LOCAL_SERVE_PREFIX, self.bucket, key))
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        let path = self.key_to_path(key)?;
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        if meta.is_dir() {
            return Err(StorageError::NotFound(format!(
                "{} is a directory, not an object",
                key
            )));
        }
        let modified = modified_millis(&meta);
        Ok(ObjectStat {
            content_type: content_type_for(&path),
            size: meta.len(),
            etag: synthetic_etag(modified, meta.len()),
            last_modified: modified,
        })
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let path = self.key_to_path(key)?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    async fn read_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes> {
        let path = self.key_to_path(key)?;
        let mut file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        let len = file.metadata().await?.len();
        if start >= len {
            return Ok(Bytes::new());
        }
        let end = end.min(len.saturating_sub(1));
        let want = (end - start + 1) as usize;

        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; want];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
