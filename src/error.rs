//! Storage layer error types
//!
//! Structured error handling for the storage access layer. Backend-specific
//! error text is classified into this taxonomy so callers can make retry and
//! presentation decisions without parsing strings themselves.

use thiserror::Error;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error taxonomy for the storage access layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Malformed or unsafe path/bucket name. Rejected before any I/O.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Backing object or prefix absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend reported an authorization failure.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The circuit breaker is currently rejecting calls.
    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    /// Connection failures and similar transient conditions.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Upload failed, wrapping the underlying cause.
    #[error("Upload failed for {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: Box<StorageError>,
    },

    /// Download failed, wrapping the underlying cause.
    #[error("Download failed for {path}: {source}")]
    Download {
        path: String,
        #[source]
        source: Box<StorageError>,
    },

    /// Unclassified backend error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration problem (missing credentials, unknown bucket).
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error from the local filesystem adapter.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the operation that produced this error may be retried.
    ///
    /// Validation, not-found and access-denied conditions are never
    /// retryable; transient network conditions are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Network(_) | StorageError::Timeout(_)
        )
    }

    /// Classify a backend error message into the taxonomy.
    ///
    /// Backends report failures as free text; known substrings are mapped to
    /// distinct variants so callers can render 404/403-equivalent behavior.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("not found") || lower.contains("no such") || lower.contains("404") {
            StorageError::NotFound(message.to_string())
        } else if lower.contains("access denied")
            || lower.contains("forbidden")
            || lower.contains("unauthorized")
            || lower.contains("403")
        {
            StorageError::AccessDenied(message.to_string())
        } else if lower.contains("timeout") || lower.contains("timed out") {
            StorageError::Timeout(message.to_string())
        } else if lower.contains("connect") || lower.contains("network") || lower.contains("dns") {
            StorageError::Network(message.to_string())
        } else {
            StorageError::Backend(message.to_string())
        }
    }

    /// Create a StorageError from an HTTP status code and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => StorageError::AccessDenied(format!("HTTP {}: {}", status, body)),
            404 => StorageError::NotFound(body.to_string()),
            408 => StorageError::Timeout(body.to_string()),
            429 => StorageError::Network(format!("rate limited: {}", body)),
            500..=599 => StorageError::Network(format!("HTTP {}: {}", status, body)),
            _ => StorageError::Backend(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout(err.to_string())
        } else if err.is_connect() {
            StorageError::Network(err.to_string())
        } else {
            StorageError::Backend(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        assert!(matches!(
            StorageError::classify("file not found in bucket"),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            StorageError::classify("No such key"),
            StorageError::NotFound(_)
        ));
    }

    #[test]
    fn test_classify_access_denied() {
        assert!(matches!(
            StorageError::classify("Access Denied"),
            StorageError::AccessDenied(_)
        ));
        assert!(matches!(
            StorageError::classify("403 Forbidden"),
            StorageError::AccessDenied(_)
        ));
    }

    #[test]
    fn test_classify_transient() {
        assert!(StorageError::classify("connection refused").is_retryable());
        assert!(StorageError::classify("operation timed out").is_retryable());
        assert!(!StorageError::classify("bucket quota exceeded").is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            StorageError::from_status(404, "missing"),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            StorageError::from_status(403, "nope"),
            StorageError::AccessDenied(_)
        ));
        assert!(StorageError::from_status(503, "unavailable").is_retryable());
    }

    #[test]
    fn test_upload_error_carries_cause() {
        let err = StorageError::Upload {
            path: "/docs/report.pdf".to_string(),
            source: Box::new(StorageError::Network("connection reset".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("/docs/report.pdf"));
        assert!(msg.contains("connection reset"));
    }
}
