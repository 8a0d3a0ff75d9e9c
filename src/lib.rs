//! shelfgate: resilient, cache-accelerated storage access for the Shelf
//! file browser.
//!
//! The crate exposes one composition surface, [`StorageService`], built from
//! a [`StorageConfig`]. Underneath it sit a bounded per-bucket client pool,
//! a circuit breaker guarding the remote backend, and TTL+LRU caches for
//! listings, object metadata, and bucket accessibility. Buckets resolve to
//! either a remote object-storage client or a local filesystem adapter; both
//! speak the same [`ObjectClient`] trait.
//!
//! ```no_run
//! use shelfgate::{StorageConfig, StorageService};
//!
//! # async fn run() -> shelfgate::Result<()> {
//! let config: StorageConfig = serde_json::from_str(r#"{
//!     "local": { "enabled": true, "base_path": "/var/lib/shelf" },
//!     "buckets": ["local"],
//!     "default_bucket": "local"
//! }"#).map_err(|e| shelfgate::StorageError::Config(e.to_string()))?;
//!
//! let service = StorageService::new(config);
//! let listing = service.list_files("/photos", None).await?;
//! for item in listing.items {
//!     println!("{} ({:?})", item.name, item.kind);
//! }
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod path;
pub mod pool;
pub mod service;
pub mod types;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use cache::{CacheStats, TtlCache};
pub use client::{ClientKind, ListRequest, Listing, ObjectClient, ObjectEntry, ObjectStat};
pub use config::{LocalConfig, RemoteConfig, StorageConfig};
pub use error::{Result, StorageError};
pub use path::Breadcrumb;
pub use pool::ClientPool;
pub use service::{
    ByteRange, CancelHandle, DownloadStream, ServiceCacheStats, StorageService, UploadSource,
};
pub use types::{BucketInfo, EntryKind, FileItem, FileMetadata, ListingResult};
