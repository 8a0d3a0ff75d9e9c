//! Storage layer configuration
//!
//! Typed configuration consumed by the storage access layer. Loading and
//! merging (files, environment) belong to the embedding application; this
//! layer treats the structure as already validated.

use serde::Deserialize;

/// Reserved bucket name that always resolves to the local adapter.
pub const LOCAL_BUCKET_NAME: &str = "local";

/// Bucket-name prefix that resolves to the local adapter.
pub const LOCAL_BUCKET_PREFIX: &str = "local-";

/// Remote object-storage endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// API endpoint base URL.
    pub endpoint: String,
    /// Application key ID.
    pub key_id: String,
    /// Application key secret.
    pub key: String,
    /// Region hint (informational; not all backends use it).
    #[serde(default)]
    pub region: Option<String>,
}

/// Local filesystem emulation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Whether local-designated buckets are served at all.
    pub enabled: bool,
    /// Root directory; buckets live under `base_path/<bucket>/`.
    pub base_path: std::path::PathBuf,
}

/// Full configuration for the storage access layer.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Remote backend; `None` means every bucket resolves to local storage.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    /// Local filesystem emulation.
    pub local: LocalConfig,
    /// Buckets the application exposes.
    #[serde(default)]
    pub buckets: Vec<String>,
    /// Bucket used when callers omit one.
    pub default_bucket: String,
}

impl StorageConfig {
    /// Whether `bucket` is served by the local adapter.
    ///
    /// Local is selected when no remote endpoint is configured, or the name
    /// is the reserved local bucket, or it carries the local prefix.
    pub fn is_local_bucket(&self, bucket: &str) -> bool {
        self.remote.is_none()
            || bucket == LOCAL_BUCKET_NAME
            || bucket.starts_with(LOCAL_BUCKET_PREFIX)
    }

    /// Resolve an optional caller-supplied bucket to a concrete name.
    pub fn resolve_bucket<'a>(&'a self, bucket: Option<&'a str>) -> &'a str {
        bucket.unwrap_or(&self.default_bucket)
    }
}
