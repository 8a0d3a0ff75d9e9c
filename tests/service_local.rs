//! End-to-end exercise of the storage service over the local filesystem
//! adapter. Remote-only behavior (auth, presign tokens, breaker trips) is
//! covered by unit tests; this file covers the full public surface the way
//! a routing layer would drive it.

use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use tempfile::TempDir;

use shelfgate::{
    ByteRange, EntryKind, LocalConfig, StorageConfig, StorageError, StorageService, UploadSource,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn local_service(dir: &TempDir) -> StorageService {
    init_logging();
    StorageService::new(StorageConfig {
        remote: None,
        local: LocalConfig {
            enabled: true,
            base_path: dir.path().to_path_buf(),
        },
        buckets: vec!["main".to_string(), "local-scratch".to_string()],
        default_bucket: "main".to_string(),
    })
}

async fn put(svc: &StorageService, path: &str, data: &[u8]) {
    svc.upload_file(
        path,
        UploadSource::Bytes(Bytes::copy_from_slice(data)),
        None,
        None,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_browse_upload_download_delete_cycle() {
    let dir = TempDir::new().unwrap();
    let svc = local_service(&dir);

    put(&svc, "/photos/2024/img_001.jpg", b"jpeg-bytes").await;
    put(&svc, "/photos/2024/img_002.jpg", b"more-jpeg-bytes").await;
    put(&svc, "/photos/notes.txt", b"hello").await;
    svc.create_folder("/photos/raw", None).await.unwrap();

    // Root shows the top-level folder only.
    let root = svc.list_files("/", None).await.unwrap();
    assert_eq!(root.items.len(), 1);
    assert_eq!(root.items[0].name, "photos");
    assert_eq!(root.items[0].kind, EntryKind::Folder);
    assert!(root.breadcrumbs.is_empty());

    // Folders first, then files, each sorted by name.
    let photos = svc.list_files("/photos", None).await.unwrap();
    let names: Vec<&str> = photos.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["2024", "raw", "notes.txt"]);
    assert_eq!(photos.breadcrumbs.len(), 1);
    assert_eq!(photos.breadcrumbs[0].path, "/photos");

    // Metadata reflects the upload.
    let meta = svc
        .get_file_metadata("/photos/2024/img_001.jpg", None)
        .await
        .unwrap();
    assert_eq!(meta.content_length, 10);
    assert_eq!(meta.content_type, "image/jpeg");
    assert!(meta.accept_ranges);

    // Full download round-trips.
    let stream = svc
        .download_stream("/photos/notes.txt", None, None)
        .await
        .unwrap();
    let chunks: Vec<Bytes> = stream.into_stream().try_collect().await.unwrap();
    let body: Vec<u8> = chunks.concat();
    assert_eq!(body, b"hello");

    // Ranged download returns just the slice.
    let mut ranged = svc
        .download_stream(
            "/photos/notes.txt",
            None,
            Some(ByteRange { start: 1, end: 3 }),
        )
        .await
        .unwrap();
    let mut sliced = Vec::new();
    while let Some(chunk) = ranged.next_chunk().await.unwrap() {
        sliced.extend_from_slice(&chunk);
    }
    assert_eq!(sliced, b"ell");

    // Delete the subtree; the sibling file survives.
    svc.delete_item("/photos/2024/", None).await.unwrap();
    let after = svc.list_files("/photos", None).await.unwrap();
    let names: Vec<&str> = after.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["raw", "notes.txt"]);
}

#[tokio::test]
async fn test_listing_cache_serves_repeat_reads() {
    let dir = TempDir::new().unwrap();
    let svc = local_service(&dir);
    put(&svc, "/docs/a.txt", b"a").await;

    let _ = svc.list_files("/docs", None).await.unwrap();
    let _ = svc.list_files("/docs", None).await.unwrap();
    let stats = svc.cache_stats();
    assert!(stats.listings.hits >= 1, "second listing should hit cache");

    // A mutation brings the listing back in sync.
    put(&svc, "/docs/b.txt", b"b").await;
    let listing = svc.list_files("/docs", None).await.unwrap();
    assert_eq!(listing.items.len(), 2);
}

#[tokio::test]
async fn test_buckets_are_isolated() {
    let dir = TempDir::new().unwrap();
    let svc = local_service(&dir);

    put(&svc, "/shared.txt", b"main").await;
    svc.upload_file(
        "/shared.txt",
        UploadSource::Bytes(Bytes::from_static(b"scratch")),
        None,
        Some("local-scratch"),
    )
    .await
    .unwrap();

    let main_meta = svc.get_file_metadata("/shared.txt", None).await.unwrap();
    let scratch_meta = svc
        .get_file_metadata("/shared.txt", Some("local-scratch"))
        .await
        .unwrap();
    assert_eq!(main_meta.content_length, 4);
    assert_eq!(scratch_meta.content_length, 7);
}

#[tokio::test]
async fn test_download_url_and_missing_object() {
    let dir = TempDir::new().unwrap();
    let svc = local_service(&dir);
    put(&svc, "/file.bin", b"x").await;

    let url = svc
        .get_download_url("/file.bin", Duration::from_secs(3600), None)
        .await
        .unwrap();
    assert_eq!(url, "/local-files/main/file.bin");

    assert!(matches!(
        svc.download_stream("/absent.bin", None, None).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_bucket_validation_reports_all_configured() {
    let dir = TempDir::new().unwrap();
    let svc = local_service(&dir);

    let infos = svc.validate_all_buckets().await;
    assert_eq!(infos.len(), 2);
    assert!(infos.iter().all(|b| b.accessible));
    assert!(infos.iter().any(|b| b.is_default && b.name == "main"));
}

#[tokio::test]
async fn test_traversal_is_rejected_everywhere() {
    let dir = TempDir::new().unwrap();
    let svc = local_service(&dir);

    let evil = "/docs/../../etc/passwd";
    assert!(svc.list_files(evil, None).await.is_err());
    assert!(svc.get_file_metadata(evil, None).await.is_err());
    assert!(svc.delete_item(evil, None).await.is_err());
    assert!(svc
        .upload_file(evil, UploadSource::Bytes(Bytes::new()), None, None)
        .await
        .is_err());

    // Nothing escaped the storage root.
    assert!(!dir.path().join("../etc").exists());
}
