//! Storage service orchestrator
//!
//! Public operations for the file browser: listing, metadata, upload,
//! download, folder creation, deletion, and bucket validation. The service
//! resolves clients through the pool, consults the caches for reads, wraps
//! remote calls in the circuit breaker, and invalidates the affected cache
//! entries (path and parent) after every mutation.

mod download;

pub use download::{ByteRange, CancelHandle, DownloadStream, DEFAULT_CHUNK_SIZE};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::cache::{CacheStats, TtlCache};
use crate::client::{ClientKind, ListRequest, ObjectClient};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::path;
use crate::pool::ClientPool;
use crate::types::{now_millis, BucketInfo, EntryKind, FileItem, FileMetadata, ListingResult};

/// Listing cache: short TTL, listings go stale quickly.
const LISTING_TTL: Duration = Duration::from_secs(60);
const LISTING_CAPACITY: usize = 500;

/// Metadata cache: objects are immutable-ish, longer TTL.
const METADATA_TTL: Duration = Duration::from_secs(300);
const METADATA_CAPACITY: usize = 1000;

/// Bucket accessibility cache.
const BUCKET_TTL: Duration = Duration::from_secs(300);
const BUCKET_CAPACITY: usize = 100;

/// Entries requested per listing call.
const LIST_MAX_KEYS: usize = 1000;

/// Zero-byte marker object kept inside otherwise-empty folders.
const FOLDER_MARKER: &str = ".folder";

/// Accumulation chunk size when draining streamed upload input.
const UPLOAD_READ_CHUNK: usize = 64 * 1024;

/// Uploads are retried this many times on transient errors.
const UPLOAD_MAX_RETRIES: u32 = 3;

/// Backoff schedule between upload retries, milliseconds.
const UPLOAD_BACKOFF_MS: [u64; 3] = [500, 1000, 2000];

/// Downloads past this size get a warning; they are served chunked either way.
const LARGE_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Input accepted by [`StorageService::upload_file`].
///
/// Streamed input is drained into a single buffer through a bounded-chunk
/// read loop before the write is attempted.
pub enum UploadSource {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl From<Bytes> for UploadSource {
    fn from(data: Bytes) -> Self {
        UploadSource::Bytes(data)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(data: Vec<u8>) -> Self {
        UploadSource::Bytes(Bytes::from(data))
    }
}

/// Hit/miss counters for the service's three caches.
#[derive(Debug, Clone, Copy)]
pub struct ServiceCacheStats {
    pub listings: CacheStats,
    pub metadata: CacheStats,
    pub buckets: CacheStats,
}

/// Orchestrating storage service.
///
/// Owns the pool, the breaker, and the caches; constructed once at the
/// composition root and shared by handle. No global state.
pub struct StorageService {
    config: StorageConfig,
    pool: ClientPool,
    breaker: CircuitBreaker,
    listing_cache: TtlCache<ListingResult>,
    metadata_cache: TtlCache<FileMetadata>,
    bucket_cache: TtlCache<bool>,
}

impl StorageService {
    pub fn new(config: StorageConfig) -> Self {
        Self::with_breaker(config, CircuitBreakerConfig::default())
    }

    pub fn with_breaker(config: StorageConfig, breaker: CircuitBreakerConfig) -> Self {
        let pool = ClientPool::new(config.clone());
        Self {
            config,
            pool,
            breaker: CircuitBreaker::new(breaker),
            listing_cache: TtlCache::new("listings", LISTING_CAPACITY, LISTING_TTL),
            metadata_cache: TtlCache::new("metadata", METADATA_CAPACITY, METADATA_TTL),
            bucket_cache: TtlCache::new("buckets", BUCKET_CAPACITY, BUCKET_TTL),
        }
    }

    /// List the immediate children of a directory path.
    pub async fn list_files(&self, raw_path: &str, bucket: Option<&str>) -> Result<ListingResult> {
        path::validate(raw_path)?;
        let bucket = self.config.resolve_bucket(bucket).to_string();
        path::validate_bucket(&bucket)?;

        let normalized = normalize(raw_path);
        let cache_key = cache_key(&bucket, &normalized);
        if let Some(cached) = self.listing_cache.get(&cache_key) {
            return Ok(cached);
        }

        let client = self.pool.get(&bucket).await?;
        let prefix = path::listing_prefix(raw_path);
        let request = ListRequest {
            prefix: prefix.clone(),
            delimiter: Some(path::SEPARATOR),
            max_keys: LIST_MAX_KEYS,
        };
        let listing = self
            .guarded(&client, || client.list(&request))
            .await?;

        // A folder exists iff something lives under it (markers count). The
        // bucket root always exists.
        if normalized != "/"
            && listing.contents.is_empty()
            && listing.common_prefixes.is_empty()
        {
            return Err(StorageError::NotFound(normalized));
        }

        let result = build_listing(&normalized, &prefix, listing);
        self.listing_cache.set(cache_key, result.clone());
        Ok(result)
    }

    /// Time-limited retrieval URL for one object.
    pub async fn get_download_url(
        &self,
        raw_path: &str,
        expires_in: Duration,
        bucket: Option<&str>,
    ) -> Result<String> {
        path::validate(raw_path)?;
        let bucket = self.config.resolve_bucket(bucket).to_string();
        let client = self.pool.get(&bucket).await?;
        let key = path::to_key(raw_path);
        self.guarded(&client, || client.presign(&key, expires_in))
            .await
    }

    /// Create a folder by writing a zero-length marker object.
    ///
    /// The marker keeps empty directories visible through prefix listing on
    /// backends that do not retain empty "directories".
    pub async fn create_folder(&self, raw_path: &str, bucket: Option<&str>) -> Result<()> {
        path::validate(raw_path)?;
        let bucket = self.config.resolve_bucket(bucket).to_string();
        let client = self.pool.get(&bucket).await?;

        let marker_key = format!("{}/{}", path::to_key(raw_path), FOLDER_MARKER);
        self.guarded(&client, || {
            client.write(&marker_key, Bytes::new(), "application/x-directory")
        })
        .await?;

        info!(bucket = %bucket, path = raw_path, "created folder");
        self.invalidate_cache(raw_path, Some(&bucket));
        Ok(())
    }

    /// Delete an object, or a whole subtree when the path ends with `/`.
    pub async fn delete_item(&self, raw_path: &str, bucket: Option<&str>) -> Result<()> {
        path::validate(raw_path)?;
        let bucket = self.config.resolve_bucket(bucket).to_string();
        let client = self.pool.get(&bucket).await?;
        let key = path::to_key(raw_path);

        if raw_path.ends_with(path::SEPARATOR) && !key.is_empty() {
            self.delete_tree(&client, &key).await?;
        } else {
            self.guarded(&client, || client.delete(&key)).await?;
        }

        info!(bucket = %bucket, path = raw_path, "deleted item");
        self.invalidate_cache(raw_path, Some(&bucket));
        Ok(())
    }

    async fn delete_tree(&self, client: &Arc<dyn ObjectClient>, key: &str) -> Result<()> {
        let tree_key = format!("{}{}", key, path::SEPARATOR);
        if client.kind() == ClientKind::Local {
            // The local adapter removes directory trees natively.
            return client.delete(&tree_key).await;
        }

        // Remote backends have no recursive delete; enumerate and delete.
        let request = ListRequest {
            prefix: tree_key,
            delimiter: None,
            max_keys: usize::MAX,
        };
        let listing = self.guarded(client, || client.list(&request)).await?;
        for entry in listing.contents {
            self.guarded(client, || client.delete(&entry.key)).await?;
        }
        Ok(())
    }

    /// Upload an object, invalidating the affected cache entries on success.
    pub async fn upload_file(
        &self,
        raw_path: &str,
        source: UploadSource,
        content_type: Option<&str>,
        bucket: Option<&str>,
    ) -> Result<()> {
        path::validate(raw_path)?;
        let bucket = self.config.resolve_bucket(bucket).to_string();
        let client = self.pool.get(&bucket).await?;
        let key = path::to_key(raw_path);

        let data = drain_source(source).await.map_err(|e| StorageError::Upload {
            path: raw_path.to_string(),
            source: Box::new(e),
        })?;
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(raw_path));

        let mut last_error: Option<StorageError> = None;
        for attempt in 0..=UPLOAD_MAX_RETRIES {
            match self
                .guarded(&client, || client.write(&key, data.clone(), &content_type))
                .await
            {
                Ok(()) => {
                    debug!(bucket = %bucket, path = raw_path, size = data.len(), "upload complete");
                    self.invalidate_cache(raw_path, Some(&bucket));
                    return Ok(());
                }
                Err(err) => {
                    let retryable = err.is_retryable() && attempt < UPLOAD_MAX_RETRIES;
                    if !retryable {
                        last_error = Some(err);
                        break;
                    }
                    let delay = UPLOAD_BACKOFF_MS
                        .get(attempt as usize)
                        .copied()
                        .unwrap_or(2000);
                    warn!(
                        path = raw_path,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        error = %err,
                        "retrying upload"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }

        Err(StorageError::Upload {
            path: raw_path.to_string(),
            source: Box::new(last_error.unwrap_or_else(|| {
                StorageError::Backend("upload failed with no recorded error".to_string())
            })),
        })
    }

    /// Open a pull-based chunked download for one object.
    ///
    /// The object is never materialized eagerly; each chunk is fetched when
    /// the consumer asks for it, bounded by the default chunk size.
    pub async fn download_stream(
        &self,
        raw_path: &str,
        bucket: Option<&str>,
        range: Option<ByteRange>,
    ) -> Result<DownloadStream> {
        path::validate(raw_path)?;
        let metadata = self.get_file_metadata(raw_path, bucket).await?;
        if metadata.content_length > LARGE_DOWNLOAD_BYTES {
            warn!(
                path = raw_path,
                size = metadata.content_length,
                "large download, serving chunked"
            );
        }

        let bucket = self.config.resolve_bucket(bucket).to_string();
        let client = self.pool.get(&bucket).await?;
        DownloadStream::new(
            client,
            path::to_key(raw_path),
            metadata,
            range,
            DEFAULT_CHUNK_SIZE,
        )
    }

    /// Stat one object, served from the metadata cache when fresh.
    pub async fn get_file_metadata(
        &self,
        raw_path: &str,
        bucket: Option<&str>,
    ) -> Result<FileMetadata> {
        path::validate(raw_path)?;
        let bucket = self.config.resolve_bucket(bucket).to_string();

        let normalized = normalize(raw_path);
        let cache_key = cache_key(&bucket, &normalized);
        if let Some(cached) = self.metadata_cache.get(&cache_key) {
            return Ok(cached);
        }

        let client = self.pool.get(&bucket).await?;
        let key = path::to_key(raw_path);
        let stat = self.guarded(&client, || client.stat(&key)).await?;

        let metadata = FileMetadata {
            content_type: stat.content_type,
            content_length: stat.size,
            etag: stat.etag,
            last_modified: stat.last_modified,
            // Both backends serve ranged reads.
            accept_ranges: true,
        };
        self.metadata_cache.set(cache_key, metadata.clone());
        Ok(metadata)
    }

    /// Probe one bucket for accessibility. Advisory: a circuit-open
    /// condition degrades to "inaccessible" instead of erroring.
    pub async fn validate_bucket(&self, bucket: &str) -> Result<BucketInfo> {
        path::validate_bucket(bucket)?;

        let accessible = match self.bucket_cache.get(bucket) {
            Some(cached) => cached,
            None => {
                let probed = self.probe_bucket(bucket).await;
                self.bucket_cache.set(bucket.to_string(), probed);
                probed
            }
        };

        Ok(BucketInfo {
            name: bucket.to_string(),
            is_default: bucket == self.config.default_bucket,
            accessible,
            last_validated: now_millis(),
        })
    }

    async fn probe_bucket(&self, bucket: &str) -> bool {
        if self.config.is_local_bucket(bucket) {
            return self.config.local.enabled;
        }

        let client = match self.pool.get(bucket).await {
            Ok(client) => client,
            Err(err) => {
                warn!(bucket = bucket, error = %err, "bucket client unavailable");
                return false;
            }
        };

        let request = ListRequest {
            prefix: String::new(),
            delimiter: Some(path::SEPARATOR),
            max_keys: 1,
        };
        let probe = self
            .breaker
            .execute_with_fallback(
                || async {
                    client.list(&request).await?;
                    Ok(true)
                },
                || async { Ok(false) },
            )
            .await;

        match probe {
            Ok(accessible) => accessible,
            Err(err) => {
                warn!(bucket = bucket, error = %err, "bucket probe failed");
                false
            }
        }
    }

    /// Validate every configured bucket.
    pub async fn validate_all_buckets(&self) -> Vec<BucketInfo> {
        let mut results = Vec::new();
        for bucket in self.available_buckets() {
            match self.validate_bucket(&bucket).await {
                Ok(info) => results.push(info),
                Err(err) => {
                    warn!(bucket = %bucket, error = %err, "bucket validation rejected");
                    results.push(BucketInfo {
                        name: bucket,
                        is_default: false,
                        accessible: false,
                        last_validated: now_millis(),
                    });
                }
            }
        }
        results
    }

    /// Configured bucket names, default first.
    pub fn available_buckets(&self) -> Vec<String> {
        let mut names = vec![self.config.default_bucket.clone()];
        for bucket in &self.config.buckets {
            if *bucket != self.config.default_bucket {
                names.push(bucket.clone());
            }
        }
        names
    }

    /// Drop the listing and metadata entries for a path, its descendants,
    /// and its parent.
    ///
    /// The descendant prefix is terminated at a path boundary so sibling
    /// paths sharing a name prefix (`/docs` vs `/docs2`) stay cached.
    pub fn invalidate_cache(&self, raw_path: &str, bucket: Option<&str>) {
        let bucket = self.config.resolve_bucket(bucket);
        let normalized = normalize(raw_path);
        let parent = path::parent(&normalized);

        let own = cache_key(bucket, &normalized);
        let subtree = if normalized == "/" {
            own.clone()
        } else {
            format!("{}/", own)
        };
        let parent_key = cache_key(bucket, &parent);

        self.listing_cache.invalidate(&own);
        self.listing_cache.invalidate_prefix(&subtree);
        self.listing_cache.invalidate(&parent_key);
        self.metadata_cache.invalidate(&own);
        self.metadata_cache.invalidate_prefix(&subtree);
        self.metadata_cache.invalidate(&parent_key);

        debug!(bucket = bucket, path = %normalized, parent = %parent, "invalidated cache");
    }

    /// Hit/miss counters for diagnostics.
    pub fn cache_stats(&self) -> ServiceCacheStats {
        ServiceCacheStats {
            listings: self.listing_cache.stats(),
            metadata: self.metadata_cache.stats(),
            buckets: self.bucket_cache.stats(),
        }
    }

    /// Route a client call through the breaker when the backend is remote.
    /// Local filesystem calls cannot trip the circuit.
    async fn guarded<T, F, Fut>(&self, client: &Arc<dyn ObjectClient>, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if client.kind() == ClientKind::Remote {
            self.breaker.execute(op).await
        } else {
            op().await
        }
    }
}

/// Normalize a raw path to its canonical `/`-rooted form.
fn normalize(raw_path: &str) -> String {
    let key = path::to_key(raw_path);
    if key.is_empty() {
        path::SEPARATOR.to_string()
    } else {
        format!("{}{}", path::SEPARATOR, key)
    }
}

fn cache_key(bucket: &str, normalized: &str) -> String {
    format!("{}:{}", bucket, normalized)
}

fn guess_content_type(raw_path: &str) -> String {
    mime_guess::from_path(raw_path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Drain upload input into one buffer via a bounded-chunk read loop.
async fn drain_source(source: UploadSource) -> Result<Bytes> {
    match source {
        UploadSource::Bytes(data) => Ok(data),
        UploadSource::Reader(mut reader) => {
            let mut accumulated = BytesMut::new();
            let mut chunk = vec![0u8; UPLOAD_READ_CHUNK];
            loop {
                let read = reader.read(&mut chunk).await?;
                if read == 0 {
                    break;
                }
                accumulated.extend_from_slice(&chunk[..read]);
            }
            Ok(accumulated.freeze())
        }
    }
}

/// Assemble a sorted listing from the client's raw response.
fn build_listing(
    normalized: &str,
    prefix: &str,
    listing: crate::client::Listing,
) -> ListingResult {
    let mut folders: Vec<FileItem> = Vec::new();
    let mut files: Vec<FileItem> = Vec::new();

    // Delimiter-synthesized sub-prefixes become folder entries.
    for common in &listing.common_prefixes {
        let name = common
            .strip_prefix(prefix)
            .unwrap_or(common)
            .trim_end_matches(path::SEPARATOR);
        if name.is_empty() {
            continue;
        }
        folders.push(folder_item(normalized, name));
    }

    for entry in &listing.contents {
        // The prefix's own marker shows up in its parent listing.
        let Some(relative) = entry.key.strip_prefix(prefix) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }
        if entry.size == 0 && entry.key.ends_with(path::SEPARATOR) {
            // Explicit folder marker object; dedupe against common prefixes.
            let name = relative.trim_end_matches(path::SEPARATOR);
            if !name.is_empty() && !folders.iter().any(|f| f.name == name) {
                folders.push(folder_item(normalized, name));
            }
            continue;
        }
        if relative.contains(path::SEPARATOR) {
            // Belongs to a deeper level.
            continue;
        }
        if relative == FOLDER_MARKER {
            continue;
        }
        files.push(FileItem {
            name: relative.to_string(),
            kind: EntryKind::File,
            size: entry.size,
            modified: entry.last_modified,
            path: child_path(normalized, relative),
            content_type: mime_guess::from_path(relative).first().map(|m| m.to_string()),
        });
    }

    folders.sort_by(|a, b| a.name.cmp(&b.name));
    files.sort_by(|a, b| a.name.cmp(&b.name));

    let mut items = folders;
    items.append(&mut files);

    ListingResult {
        path: normalized.to_string(),
        items,
        breadcrumbs: path::breadcrumbs(prefix),
    }
}

fn folder_item(normalized: &str, name: &str) -> FileItem {
    FileItem {
        name: name.to_string(),
        kind: EntryKind::Folder,
        size: 0,
        modified: 0,
        path: child_path(normalized, name),
        content_type: None,
    }
}

fn child_path(normalized: &str, name: &str) -> String {
    if normalized == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", normalized, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalConfig;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> StorageService {
        StorageService::new(StorageConfig {
            remote: None,
            local: LocalConfig {
                enabled: true,
                base_path: dir.path().to_path_buf(),
            },
            buckets: vec!["main".to_string(), "scratch".to_string()],
            default_bucket: "main".to_string(),
        })
    }

    async fn seed(svc: &StorageService, path: &str, data: &str) {
        svc.upload_file(path, Bytes::from(data.to_string()).into(), None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_listing_folders_first_sorted() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        seed(&svc, "/photos/a.jpg", "a").await;
        seed(&svc, "/photos/sub/b.jpg", "b").await;
        svc.create_folder("/photos/empty", None).await.unwrap();

        let listing = svc.list_files("/photos", None).await.unwrap();
        let names: Vec<(&str, EntryKind)> = listing
            .items
            .iter()
            .map(|i| (i.name.as_str(), i.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("empty", EntryKind::Folder),
                ("sub", EntryKind::Folder),
                ("a.jpg", EntryKind::File),
            ]
        );
        assert_eq!(listing.breadcrumbs.len(), 1);
        assert_eq!(listing.breadcrumbs[0].path, "/photos");
    }

    #[tokio::test]
    async fn test_listing_file_paths_and_types() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/docs/report.pdf", "pdf").await;

        let listing = svc.list_files("/docs", None).await.unwrap();
        assert_eq!(listing.items.len(), 1);
        let item = &listing.items[0];
        assert_eq!(item.path, "/docs/report.pdf");
        assert_eq!(item.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(item.size, 3);
    }

    #[tokio::test]
    async fn test_invalid_paths_rejected_before_io() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        for bad in ["/a/../b", "/a//b", "/sp ace", ""] {
            assert!(
                matches!(
                    svc.list_files(bad, None).await,
                    Err(StorageError::InvalidPath(_))
                ),
                "expected rejection for {:?}",
                bad
            );
            assert!(matches!(
                svc.upload_file(bad, Bytes::new().into(), None, None).await,
                Err(StorageError::InvalidPath(_))
            ));
            assert!(matches!(
                svc.delete_item(bad, None).await,
                Err(StorageError::InvalidPath(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_upload_invalidates_parent_listing() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/docs/one.txt", "1").await;

        // Prime the cache.
        let before = svc.list_files("/docs", None).await.unwrap();
        assert_eq!(before.items.len(), 1);

        seed(&svc, "/docs/two.txt", "2").await;
        let after = svc.list_files("/docs", None).await.unwrap();
        assert_eq!(after.items.len(), 2, "stale listing served after upload");
    }

    #[tokio::test]
    async fn test_delete_invalidates_and_removes() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/docs/one.txt", "1").await;
        let _ = svc.list_files("/docs", None).await.unwrap();

        // Deleting the last object makes the folder itself disappear; the
        // stale cached listing must not mask that.
        svc.delete_item("/docs/one.txt", None).await.unwrap();
        assert!(matches!(
            svc.list_files("/docs", None).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        assert!(matches!(
            svc.list_files("/never-created", None).await,
            Err(StorageError::NotFound(_))
        ));

        // The root of an empty bucket still lists successfully.
        let root = svc.list_files("/", None).await.unwrap();
        assert!(root.items.is_empty());

        // A created-but-empty folder exists by virtue of its marker.
        svc.create_folder("/empty", None).await.unwrap();
        assert!(svc.list_files("/empty", None).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_stops_at_path_boundary() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/docs/a.txt", "a").await;
        seed(&svc, "/docs2/b.txt", "b").await;

        // Prime both listings.
        let _ = svc.list_files("/docs", None).await.unwrap();
        let _ = svc.list_files("/docs2", None).await.unwrap();

        // Dropping the /docs subtree must leave /docs2 cached.
        svc.delete_item("/docs/", None).await.unwrap();

        let hits_before = svc.cache_stats().listings.hits;
        let sibling = svc.list_files("/docs2", None).await.unwrap();
        assert_eq!(sibling.items.len(), 1);
        assert_eq!(
            svc.cache_stats().listings.hits,
            hits_before + 1,
            "sibling listing should still be served from cache"
        );

        assert!(matches!(
            svc.list_files("/docs", None).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_subtree_with_trailing_separator() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/docs/sub/a.txt", "a").await;
        seed(&svc, "/docs/sub/deep/b.txt", "b").await;
        seed(&svc, "/docs/keep.txt", "k").await;

        svc.delete_item("/docs/sub/", None).await.unwrap();

        let listing = svc.list_files("/docs", None).await.unwrap();
        let names: Vec<&str> = listing.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["keep.txt"]);
    }

    #[tokio::test]
    async fn test_metadata_cached_and_shaped() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/img/cat.png", "pretend-png").await;

        let meta = svc.get_file_metadata("/img/cat.png", None).await.unwrap();
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.content_length, 11);
        assert!(meta.accept_ranges);
        assert!(!meta.etag.is_empty());

        let _ = svc.get_file_metadata("/img/cat.png", None).await.unwrap();
        assert!(svc.cache_stats().metadata.hits >= 1);
    }

    #[tokio::test]
    async fn test_metadata_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        assert!(matches!(
            svc.get_file_metadata("/nope.txt", None).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_streamed_upload_source() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let payload = vec![42u8; 200_000];
        let reader: Box<dyn AsyncRead + Send + Unpin> =
            Box::new(std::io::Cursor::new(payload.clone()));
        svc.upload_file("/big.bin", UploadSource::Reader(reader), None, None)
            .await
            .unwrap();

        let meta = svc.get_file_metadata("/big.bin", None).await.unwrap();
        assert_eq!(meta.content_length, 200_000);
    }

    #[tokio::test]
    async fn test_download_stream_end_to_end() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/stream.bin", "0123456789").await;

        let mut stream = svc.download_stream("/stream.bin", None, None).await.unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, b"0123456789");
    }

    #[tokio::test]
    async fn test_download_url_local() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        seed(&svc, "/docs/file.txt", "x").await;

        let url = svc
            .get_download_url("/docs/file.txt", Duration::from_secs(600), None)
            .await
            .unwrap();
        assert_eq!(url, "/local-files/main/docs/file.txt");
    }

    #[tokio::test]
    async fn test_validate_buckets_local() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let info = svc.validate_bucket("main").await.unwrap();
        assert!(info.accessible);
        assert!(info.is_default);

        let all = svc.validate_all_buckets().await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|b| b.accessible));
    }

    #[tokio::test]
    async fn test_validate_bucket_local_disabled() {
        let dir = TempDir::new().unwrap();
        let svc = StorageService::new(StorageConfig {
            remote: None,
            local: LocalConfig {
                enabled: false,
                base_path: dir.path().to_path_buf(),
            },
            buckets: vec![],
            default_bucket: "main".to_string(),
        });

        let info = svc.validate_bucket("main").await.unwrap();
        assert!(!info.accessible);
    }

    #[tokio::test]
    async fn test_create_folder_visible_in_listing() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        svc.create_folder("/archive", None).await.unwrap();
        let listing = svc.list_files("/", None).await.unwrap();
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items[0].name, "archive");
        assert_eq!(listing.items[0].kind, EntryKind::Folder);

        // The marker itself stays hidden when listing the folder.
        let inner = svc.list_files("/archive", None).await.unwrap();
        assert!(inner.items.is_empty());
    }

    #[test]
    fn test_build_listing_skips_deep_and_marker_entries() {
        let listing = crate::client::Listing {
            contents: vec![
                crate::client::ObjectEntry {
                    key: "photos/a.jpg".to_string(),
                    size: 10,
                    last_modified: 1,
                },
                crate::client::ObjectEntry {
                    key: "photos/deep/b.jpg".to_string(),
                    size: 10,
                    last_modified: 1,
                },
                crate::client::ObjectEntry {
                    key: "photos/marked/".to_string(),
                    size: 0,
                    last_modified: 0,
                },
                crate::client::ObjectEntry {
                    key: "photos/".to_string(),
                    size: 0,
                    last_modified: 0,
                },
            ],
            common_prefixes: vec!["photos/marked/".to_string()],
        };

        let result = build_listing("/photos", "photos/", listing);
        let names: Vec<(&str, EntryKind)> = result
            .items
            .iter()
            .map(|i| (i.name.as_str(), i.kind))
            .collect();
        // "marked" appears once despite both a common prefix and a marker
        // object; the deep entry and the prefix's own key are skipped.
        assert_eq!(
            names,
            vec![("marked", EntryKind::Folder), ("a.jpg", EntryKind::File)]
        );
    }

    #[test]
    fn test_normalize_and_cache_key() {
        assert_eq!(normalize("/docs/"), "/docs");
        assert_eq!(normalize("/"), "/");
        assert_eq!(cache_key("main", "/docs"), "main:/docs");
    }
}
