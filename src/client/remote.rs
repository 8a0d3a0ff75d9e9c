//! Remote object-storage client
//!
//! Authenticated HTTP client for the remote storage API. The layer does not
//! implement storage semantics itself; every call delegates to the backend:
//! authorize, list, upload-URL handshake, delete, ranged download, and
//! download-authorization presigning.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ClientKind, ListRequest, Listing, ObjectClient, ObjectEntry, ObjectStat};
use crate::config::RemoteConfig;
use crate::error::{Result, StorageError};

/// HTTP client timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for listing calls.
const LIST_PAGE_SIZE: usize = 1000;

/// Auth state that can be refreshed on 401 (interior mutability).
struct AuthState {
    auth_token: String,
    api_url: String,
    download_url: String,
}

/// Remote storage client bound to one bucket.
pub struct RemoteClient {
    http_client: Client,
    /// Stored credentials for re-authorization.
    key_id: String,
    key: String,
    /// Auth endpoint base URL.
    endpoint: String,
    bucket: String,
    auth_state: RwLock<AuthState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsRequest {
    bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<String>,
    max_keys: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteObject {
    key: String,
    #[serde(default)]
    size: u64,
    /// Epoch milliseconds.
    #[serde(default)]
    last_modified: u64,
    /// "file" or "folder" (delimiter-synthesized prefix).
    action: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    objects: Vec<RemoteObject>,
    #[serde(default)]
    next_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadAuthorization {
    authorization_token: String,
}

/// Fold a page of remote objects into a listing.
///
/// Folder entries synthesized by the backend's delimiter handling become
/// common prefixes; everything else is a content entry.
fn fold_page(listing: &mut Listing, objects: Vec<RemoteObject>) {
    for object in objects {
        if object.action == "folder" {
            listing.common_prefixes.push(object.key);
        } else {
            listing.contents.push(ObjectEntry {
                key: object.key,
                size: object.size,
                last_modified: object.last_modified,
            });
        }
    }
}

impl RemoteClient {
    /// Authorize with the remote API and bind the client to `bucket`.
    pub async fn connect(config: &RemoteConfig, bucket: &str) -> Result<Self> {
        info!(bucket = bucket, endpoint = %config.endpoint, "authorizing remote storage client");

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Config(format!("failed to create HTTP client: {}", e)))?;

        let auth = Self::authorize(&http_client, &config.endpoint, &config.key_id, &config.key)
            .await?;

        debug!(api_url = %auth.api_url, "remote authorization successful");

        Ok(Self {
            http_client,
            key_id: config.key_id.clone(),
            key: config.key.clone(),
            endpoint: config.endpoint.clone(),
            bucket: bucket.to_string(),
            auth_state: RwLock::new(AuthState {
                auth_token: auth.authorization_token,
                api_url: auth.api_url,
                download_url: auth.download_url,
            }),
        })
    }

    async fn authorize(
        http_client: &Client,
        endpoint: &str,
        key_id: &str,
        key: &str,
    ) -> Result<AuthorizeResponse> {
        let credentials = format!("{}:{}", key_id, key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        let url = format!("{}/api/v1/authorize_account", endpoint);

        let response = http_client
            .get(&url)
            .header("Authorization", format!("Basic {}", encoded))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::from_status(status, &body));
        }

        Ok(response.json().await.map_err(StorageError::from)?)
    }

    /// Refresh the auth token by re-authorizing.
    async fn refresh_auth(&self) -> Result<()> {
        info!(bucket = %self.bucket, "refreshing remote auth token");
        let auth =
            Self::authorize(&self.http_client, &self.endpoint, &self.key_id, &self.key).await?;
        let mut state = self.auth_state.write();
        state.auth_token = auth.authorization_token;
        state.api_url = auth.api_url;
        state.download_url = auth.download_url;
        Ok(())
    }

    fn auth_token(&self) -> String {
        self.auth_state.read().auth_token.clone()
    }

    fn api_url(&self) -> String {
        self.auth_state.read().api_url.clone()
    }

    fn download_url(&self) -> String {
        self.auth_state.read().download_url.clone()
    }

    /// Run a request, refreshing the auth token once on an access-denied
    /// response. Expired tokens are the common case for long-lived handles.
    async fn with_reauth<F, Fut, T>(&self, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match call().await {
            Err(StorageError::AccessDenied(msg)) => {
                warn!(bucket = %self.bucket, error = %msg, "access denied, refreshing auth");
                self.refresh_auth().await?;
                call().await
            }
            other => other,
        }
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http_client
            .post(url)
            .header("Authorization", self.auth_token())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::from_status(status, &body));
        }

        Ok(response.json().await.map_err(StorageError::from)?)
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<char>,
        max_keys: usize,
        start_key: Option<String>,
    ) -> Result<ListObjectsResponse> {
        let url = format!("{}/api/v1/list_objects", self.api_url());
        let request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            delimiter: delimiter.map(String::from),
            max_keys: max_keys.min(LIST_PAGE_SIZE),
            start_key,
        };
        self.post_json(&url, &request).await
    }

    async fn fetch_bytes(&self, key: &str, range: Option<(u64, u64)>) -> Result<Bytes> {
        let encoded = urlencoding::encode(key);
        let url = format!("{}/file/{}/{}", self.download_url(), self.bucket, encoded);

        let mut request = self
            .http_client
            .get(&url)
            .header("Authorization", self.auth_token());
        if let Some((start, end)) = range {
            request = request.header("Range", format!("bytes={}-{}", start, end));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::from_status(status, &body));
        }

        Ok(response.bytes().await.map_err(StorageError::from)?)
    }
}

#[async_trait]
impl ObjectClient for RemoteClient {
    fn kind(&self) -> ClientKind {
        ClientKind::Remote
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, request: &ListRequest) -> Result<Listing> {
        self.with_reauth(|| async {
            let mut listing = Listing::default();
            let mut start_key: Option<String> = None;

            loop {
                let remaining = request
                    .max_keys
                    .saturating_sub(listing.contents.len() + listing.common_prefixes.len());
                if remaining == 0 {
                    break;
                }
                let page = self
                    .list_page(&request.prefix, request.delimiter, remaining, start_key)
                    .await?;
                fold_page(&mut listing, page.objects);

                match page.next_key {
                    Some(next) => start_key = Some(next),
                    None => break,
                }
            }

            debug!(
                bucket = %self.bucket,
                prefix = %request.prefix,
                contents = listing.contents.len(),
                prefixes = listing.common_prefixes.len(),
                "remote list complete"
            );
            Ok(listing)
        })
        .await
    }

    async fn write(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.with_reauth(|| async {
            let url = format!("{}/api/v1/get_upload_url", self.api_url());
            let target: UploadTarget = self
                .post_json(&url, &serde_json::json!({ "bucket": self.bucket }))
                .await?;

            use sha1::{Digest, Sha1};
            let mut hasher = Sha1::new();
            hasher.update(&data);
            let checksum = format!("{:x}", hasher.finalize());

            let encoded = urlencoding::encode(key);
            let response = self
                .http_client
                .post(&target.upload_url)
                .header("Authorization", &target.authorization_token)
                .header("X-Object-Key", encoded.as_ref())
                .header("Content-Type", content_type)
                .header("Content-Length", data.len())
                .header("X-Content-Sha1", &checksum)
                .body(data.clone())
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::from_status(status, &body));
            }

            info!(bucket = %self.bucket, key = key, size = data.len(), "uploaded object");
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_reauth(|| async {
            let url = format!("{}/api/v1/delete_object", self.api_url());
            let _: serde_json::Value = self
                .post_json(
                    &url,
                    &serde_json::json!({ "bucket": self.bucket, "key": key }),
                )
                .await?;
            info!(bucket = %self.bucket, key = key, "deleted object");
            Ok(())
        })
        .await
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.with_reauth(|| async {
            let url = format!("{}/api/v1/get_download_authorization", self.api_url());
            let auth: DownloadAuthorization = self
                .post_json(
                    &url,
                    &serde_json::json!({
                        "bucket": self.bucket,
                        "keyPrefix": key,
                        "validDurationSeconds": expires_in.as_secs(),
                    }),
                )
                .await?;

            let encoded = urlencoding::encode(key);
            Ok(format!(
                "{}/file/{}/{}?authorization={}",
                self.download_url(),
                self.bucket,
                encoded,
                auth.authorization_token
            ))
        })
        .await
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        self.with_reauth(|| async {
            // No dedicated stat call; an exact-prefix listing returns the
            // object's descriptor.
            let page = self.list_page(key, None, 1, None).await?;
            let object = page
                .objects
                .into_iter()
                .find(|o| o.key == key)
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

            Ok(ObjectStat {
                content_type: object
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                size: object.size,
                etag: object.etag.unwrap_or_default(),
                last_modified: object.last_modified,
            })
        })
        .await
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        self.with_reauth(|| self.fetch_bytes(key, None)).await
    }

    async fn read_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes> {
        self.with_reauth(|| self.fetch_bytes(key, Some((start, end))))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_request_serialization() {
        let request = ListObjectsRequest {
            bucket: "photos".to_string(),
            prefix: Some("album/".to_string()),
            delimiter: Some("/".to_string()),
            max_keys: 100,
            start_key: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"bucket\":\"photos\""));
        assert!(json.contains("\"maxKeys\":100"));
        assert!(!json.contains("startKey"));
    }

    #[test]
    fn test_fold_page_splits_folders_from_files() {
        let objects: Vec<RemoteObject> = serde_json::from_str(
            r#"[
                {"key": "album/a.jpg", "size": 12, "lastModified": 1000, "action": "file",
                 "contentType": "image/jpeg", "etag": "abc"},
                {"key": "album/sub/", "action": "folder"},
                {"key": "album/b.png", "size": 34, "lastModified": 2000, "action": "file"}
            ]"#,
        )
        .unwrap();

        let mut listing = Listing::default();
        fold_page(&mut listing, objects);

        assert_eq!(listing.common_prefixes, vec!["album/sub/".to_string()]);
        assert_eq!(listing.contents.len(), 2);
        assert_eq!(listing.contents[0].key, "album/a.jpg");
        assert_eq!(listing.contents[0].size, 12);
    }

    #[test]
    fn test_folder_entries_tolerate_missing_fields() {
        let object: RemoteObject =
            serde_json::from_str(r#"{"key": "album/sub/", "action": "folder"}"#).unwrap();
        assert_eq!(object.size, 0);
        assert_eq!(object.last_modified, 0);
        assert_eq!(object.content_type, None);
    }

    #[test]
    fn test_list_response_pagination_field() {
        let response: ListObjectsResponse = serde_json::from_str(
            r#"{"objects": [], "nextKey": "album/c.jpg"}"#,
        )
        .unwrap();
        assert_eq!(response.next_key, Some("album/c.jpg".to_string()));

        let done: ListObjectsResponse = serde_json::from_str(r#"{"objects": []}"#).unwrap();
        assert_eq!(done.next_key, None);
    }
}
