//! Photo Storage Service
//!
//! Backblaze-B2-backed object storage for inspection photos and report
//! files. The native B2 API is a three-step dance per upload (authorize,
//! get an upload URL, upload); the whole sequence is retried on transient
//! failures, and the account authorization token is cached with a
//! wall-clock expiry so most requests skip the first step.

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default maximum retry attempts for upload/delete sequences
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default maximum backoff in seconds between retries
const DEFAULT_RETRY_MAX_BACKOFF_SECS: u64 = 30;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

/// Base multiplier for exponential backoff
const BACKOFF_MULTIPLIER: u64 = 2;

/// Account authorization tokens are valid for 24 hours; refresh a little early
const AUTH_TOKEN_TTL_SECS: u64 = 23 * 60 * 60;

/// Default B2 authorization endpoint
const DEFAULT_AUTH_BASE_URL: &str = "https://api.backblazeb2.com";

// ============================================================================
// Error Types
// ============================================================================

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Account authorization failed
    #[error("Storage authorization failed: {0}")]
    Auth(String),

    /// The B2 API rejected a request
    #[error("Storage API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Network-level failure talking to the storage API
    #[error("Storage transport error: {0}")]
    Transport(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Result of classifying an error for retry purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient failure; back off and run the sequence again
    Retry,
    /// Cached authorization token is stale; drop it and run again
    Reauthorize,
    /// Permanent failure; surface immediately
    NoRetry,
}

impl StorageError {
    /// Classify this error for the retry loop
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            Self::Transport(_) => RetryDecision::Retry,
            Self::Api { status, code, .. } => {
                if *status == 401
                    && (code == "expired_auth_token" || code == "bad_auth_token")
                {
                    RetryDecision::Reauthorize
                } else if *status == 408 || *status == 429 || *status >= 500 {
                    RetryDecision::Retry
                } else {
                    RetryDecision::NoRetry
                }
            }
            Self::Auth(_) | Self::NotFound(_) | Self::Config(_) => RetryDecision::NoRetry,
        }
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// File id assigned by the storage backend
    pub file_id: String,
    /// Key the object was stored under
    pub key: String,
    /// Size in bytes
    pub size: usize,
    /// Hex SHA-1 of the content
    pub sha1: String,
}

// ============================================================================
// PhotoStorageBackend Trait
// ============================================================================

/// Object storage backend for inspection photos and report files.
///
/// The production implementation talks to Backblaze B2; tests use the
/// in-memory backend.
#[async_trait]
pub trait PhotoStorageBackend: Send + Sync {
    /// Upload an object and return its storage identifiers
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredObject, StorageError>;

    /// Delete an object by its storage file id and key.
    ///
    /// Deleting an object that is already gone is not an error.
    async fn delete(&self, file_id: &str, key: &str) -> Result<(), StorageError>;

    /// Publicly resolvable download URL for a stored key
    async fn download_url(&self, key: &str) -> Result<String, StorageError>;

    /// Cheap connectivity probe used by the health endpoint
    async fn probe(&self) -> Result<(), StorageError>;
}

// ============================================================================
// B2Config
// ============================================================================

/// Backblaze B2 configuration loaded from environment variables
///
/// # Environment Variables
///
/// - `B2_KEY_ID`: application key id (required)
/// - `B2_APPLICATION_KEY`: application key secret (required)
/// - `B2_BUCKET_ID`: bucket id uploads go to (required)
/// - `B2_BUCKET_NAME`: bucket name used in download URLs (required)
/// - `B2_AUTH_BASE_URL`: authorization endpoint override (optional)
/// - `B2_MAX_RETRIES`: retry attempts per operation (optional, default 3)
/// - `B2_RETRY_MAX_BACKOFF`: max backoff seconds (optional, default 30)
#[derive(Debug, Clone)]
pub struct B2Config {
    pub key_id: String,
    pub application_key: String,
    pub bucket_id: String,
    pub bucket_name: String,
    pub auth_base_url: String,
    pub max_retries: u32,
    pub retry_max_backoff_secs: u64,
}

impl B2Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, StorageError> {
        let key_id = env::var("B2_KEY_ID")
            .map_err(|_| StorageError::Config("B2_KEY_ID is not set".to_string()))?;
        let application_key = env::var("B2_APPLICATION_KEY")
            .map_err(|_| StorageError::Config("B2_APPLICATION_KEY is not set".to_string()))?;
        let bucket_id = env::var("B2_BUCKET_ID")
            .map_err(|_| StorageError::Config("B2_BUCKET_ID is not set".to_string()))?;
        let bucket_name = env::var("B2_BUCKET_NAME")
            .map_err(|_| StorageError::Config("B2_BUCKET_NAME is not set".to_string()))?;

        let auth_base_url =
            env::var("B2_AUTH_BASE_URL").unwrap_or_else(|_| DEFAULT_AUTH_BASE_URL.to_string());

        let max_retries = match env::var("B2_MAX_RETRIES") {
            Ok(v) => v
                .parse()
                .map_err(|_| StorageError::Config("B2_MAX_RETRIES is not a number".to_string()))?,
            Err(_) => DEFAULT_MAX_RETRIES,
        };

        let retry_max_backoff_secs = match env::var("B2_RETRY_MAX_BACKOFF") {
            Ok(v) => v.parse().map_err(|_| {
                StorageError::Config("B2_RETRY_MAX_BACKOFF is not a number".to_string())
            })?,
            Err(_) => DEFAULT_RETRY_MAX_BACKOFF_SECS,
        };

        let config = Self {
            key_id,
            application_key,
            bucket_id,
            bucket_name,
            auth_base_url,
            max_retries,
            retry_max_backoff_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration completeness
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.key_id.is_empty() || self.application_key.is_empty() {
            return Err(StorageError::Config(
                "B2 credentials cannot be empty".to_string(),
            ));
        }
        if self.bucket_id.is_empty() || self.bucket_name.is_empty() {
            return Err(StorageError::Config(
                "B2 bucket id and name cannot be empty".to_string(),
            ));
        }
        if !self.auth_base_url.starts_with("http://") && !self.auth_base_url.starts_with("https://")
        {
            return Err(StorageError::Config(
                "B2_AUTH_BASE_URL must start with http:// or https://".to_string(),
            ));
        }
        if self.max_retries > 10 {
            return Err(StorageError::Config(
                "B2_MAX_RETRIES should not exceed 10".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// B2Client Implementation
// ============================================================================

/// Cached account authorization
#[derive(Debug, Clone)]
struct CachedAuth {
    token: String,
    api_url: String,
    download_url: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    #[serde(rename = "authorizationToken")]
    authorization_token: String,
    #[serde(rename = "apiUrl")]
    api_url: String,
    #[serde(rename = "downloadUrl")]
    download_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
    #[serde(rename = "authorizationToken")]
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "fileId")]
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Backblaze B2 native-API client
pub struct B2Client {
    http: reqwest::Client,
    config: B2Config,
    auth: RwLock<Option<CachedAuth>>,
}

impl B2Client {
    pub fn new(config: B2Config) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            http: reqwest::Client::new(),
            config,
            auth: RwLock::new(None),
        })
    }

    /// Get a valid account authorization, re-authorizing if the cached one
    /// has passed its wall-clock expiry
    async fn ensure_auth(&self) -> Result<CachedAuth, StorageError> {
        {
            let guard = self.auth.read().await;
            if let Some(auth) = guard.as_ref() {
                if auth.expires_at > Instant::now() {
                    return Ok(auth.clone());
                }
            }
        }

        let mut guard = self.auth.write().await;
        // Another task may have re-authorized while we waited for the lock
        if let Some(auth) = guard.as_ref() {
            if auth.expires_at > Instant::now() {
                return Ok(auth.clone());
            }
        }

        let auth = self.authorize_account().await?;
        *guard = Some(auth.clone());
        Ok(auth)
    }

    /// Drop the cached authorization so the next call re-authorizes
    async fn invalidate_auth(&self) {
        let mut guard = self.auth.write().await;
        *guard = None;
    }

    /// Call `b2_authorize_account` with the configured application key
    async fn authorize_account(&self) -> Result<CachedAuth, StorageError> {
        let url = format!("{}/b2api/v2/b2_authorize_account", self.config.auth_base_url);
        let credentials = BASE64.encode(format!(
            "{}:{}",
            self.config.key_id, self.config.application_key
        ));

        debug!("Authorizing B2 account");

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Basic {credentials}"))
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody {
                code: "unknown".to_string(),
                message: "unreadable error body".to_string(),
            });
            return Err(StorageError::Auth(format!(
                "authorize_account failed ({status} {}): {}",
                body.code, body.message
            )));
        }

        let body: AuthorizeResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        info!("B2 account authorized");

        Ok(CachedAuth {
            token: body.authorization_token,
            api_url: body.api_url,
            download_url: body.download_url,
            expires_at: Instant::now() + Duration::from_secs(AUTH_TOKEN_TTL_SECS),
        })
    }

    /// Call `b2_get_upload_url` for the configured bucket
    async fn get_upload_url(&self, auth: &CachedAuth) -> Result<UploadUrlResponse, StorageError> {
        let url = format!("{}/b2api/v2/b2_get_upload_url", auth.api_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", &auth.token)
            .json(&serde_json::json!({ "bucketId": self.config.bucket_id }))
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        Self::parse_json_or_error(response, "get_upload_url").await
    }

    /// Run one full upload sequence: authorize, get upload URL, upload
    async fn upload_once(
        &self,
        key: &str,
        content_type: &str,
        data: &[u8],
        sha1_hex: &str,
    ) -> Result<StoredObject, StorageError> {
        let auth = self.ensure_auth().await?;
        let upload = self.get_upload_url(&auth).await?;

        let response = self
            .http
            .post(&upload.upload_url)
            .header("Authorization", &upload.authorization_token)
            .header("X-Bz-File-Name", key)
            .header("Content-Type", content_type)
            .header("X-Bz-Content-Sha1", sha1_hex)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let body: UploadResponse = Self::parse_json_or_error(response, "upload_file").await?;

        Ok(StoredObject {
            file_id: body.file_id,
            key: key.to_string(),
            size: data.len(),
            sha1: sha1_hex.to_string(),
        })
    }

    /// Decode a success body, or map an error status to `StorageError::Api`
    async fn parse_json_or_error<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<T, StorageError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| StorageError::Transport(e.to_string()))
        } else {
            let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody {
                code: "unknown".to_string(),
                message: format!("unreadable error body from {operation}"),
            });
            Err(StorageError::Api {
                status: status.as_u16(),
                code: body.code,
                message: body.message,
            })
        }
    }

    /// Calculate exponential backoff with jitter for a given attempt.
    ///
    /// delay = min(initial * 2^(attempt-1), max_backoff) + jitter(0-25%)
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base_delay_ms = INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(attempt.saturating_sub(1));
        let max_backoff_ms = self.config.retry_max_backoff_secs * 1000;
        let capped_delay_ms = base_delay_ms.min(max_backoff_ms);
        let jitter_ms = (capped_delay_ms / 4) * (rand::random::<u64>() % 100) / 100;
        Duration::from_millis(capped_delay_ms + jitter_ms)
    }

    /// Execute a storage sequence with the shared retry policy.
    ///
    /// The sequence gets `max_retries` additional attempts after the first;
    /// a stale-token failure drops the cached authorization and retries
    /// without backoff, everything else retryable backs off exponentially.
    async fn execute_with_retry<F, Fut, T>(
        &self,
        operation: &str,
        mut operation_fn: F,
    ) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StorageError>>,
    {
        let max_attempts = self.config.max_retries + 1;
        let mut last_error: Option<StorageError> = None;

        for attempt in 1..=max_attempts {
            match operation_fn().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = %operation,
                            attempt = attempt,
                            "Storage operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let decision = e.retry_decision();
                    let is_last_attempt = attempt >= max_attempts;

                    match decision {
                        RetryDecision::Reauthorize => {
                            warn!(
                                operation = %operation,
                                attempt = attempt,
                                error = %e,
                                "Storage auth token stale, re-authorizing"
                            );
                            self.invalidate_auth().await;
                        }
                        RetryDecision::Retry => {
                            if is_last_attempt {
                                error!(
                                    operation = %operation,
                                    attempt = attempt,
                                    max_attempts = max_attempts,
                                    error = %e,
                                    "Storage operation failed permanently"
                                );
                            } else {
                                let backoff = self.calculate_backoff(attempt);
                                warn!(
                                    operation = %operation,
                                    attempt = attempt,
                                    max_attempts = max_attempts,
                                    backoff_ms = backoff.as_millis() as u64,
                                    error = %e,
                                    "Storage operation failed, will retry"
                                );
                                sleep(backoff).await;
                            }
                        }
                        RetryDecision::NoRetry => {
                            error!(
                                operation = %operation,
                                attempt = attempt,
                                error = %e,
                                "Storage operation failed permanently"
                            );
                            return Err(e);
                        }
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| StorageError::Transport("all retry attempts exhausted".to_string())))
    }
}

#[async_trait]
impl PhotoStorageBackend for B2Client {
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredObject, StorageError> {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let sha1_hex = hex::encode(hasher.finalize());

        debug!(key = %key, size = data.len(), "Uploading object to B2");

        let result = self
            .execute_with_retry("upload", || {
                let sha1_hex = sha1_hex.clone();
                async move { self.upload_once(key, content_type, data, &sha1_hex).await }
            })
            .await?;

        debug!(key = %key, file_id = %result.file_id, "Object uploaded");
        Ok(result)
    }

    async fn delete(&self, file_id: &str, key: &str) -> Result<(), StorageError> {
        debug!(key = %key, file_id = %file_id, "Deleting object from B2");

        let result = self
            .execute_with_retry("delete", || async move {
                let auth = self.ensure_auth().await?;
                let url = format!("{}/b2api/v2/b2_delete_file_version", auth.api_url);
                let response = self
                    .http
                    .post(&url)
                    .header("Authorization", &auth.token)
                    .json(&serde_json::json!({ "fileName": key, "fileId": file_id }))
                    .send()
                    .await
                    .map_err(|e| StorageError::Transport(e.to_string()))?;

                Self::parse_json_or_error::<serde_json::Value>(response, "delete_file_version")
                    .await
                    .map(|_| ())
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            // Already gone counts as deleted
            Err(StorageError::Api { code, .. }) if code == "file_not_present" => {
                debug!(key = %key, "Object already absent, treating delete as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn download_url(&self, key: &str) -> Result<String, StorageError> {
        let auth = self.ensure_auth().await?;
        Ok(format!(
            "{}/file/{}/{}",
            auth.download_url, self.config.bucket_name, key
        ))
    }

    async fn probe(&self) -> Result<(), StorageError> {
        self.ensure_auth().await.map(|_| ())
    }
}

// ============================================================================
// In-Memory Backend (tests)
// ============================================================================

/// In-memory storage backend used by tests and local development
#[derive(Default)]
pub struct InMemoryPhotoStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryPhotoStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("storage lock poisoned").len()
    }

    /// Whether a key currently exists
    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .expect("storage lock poisoned")
            .contains_key(key)
    }
}

#[async_trait]
impl PhotoStorageBackend for InMemoryPhotoStorage {
    async fn upload(
        &self,
        key: &str,
        _content_type: &str,
        data: &[u8],
    ) -> Result<StoredObject, StorageError> {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let sha1_hex = hex::encode(hasher.finalize());

        self.objects
            .lock()
            .expect("storage lock poisoned")
            .insert(key.to_string(), data.to_vec());

        Ok(StoredObject {
            file_id: format!("mem-{}", Uuid::new_v4()),
            key: key.to_string(),
            size: data.len(),
            sha1: sha1_hex,
        })
    }

    async fn delete(&self, _file_id: &str, key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .expect("storage lock poisoned")
            .remove(key);
        Ok(())
    }

    async fn download_url(&self, key: &str) -> Result<String, StorageError> {
        Ok(format!("memory://{key}"))
    }

    async fn probe(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> B2Config {
        B2Config {
            key_id: "key-id".to_string(),
            application_key: "app-key".to_string(),
            bucket_id: "bucket-id".to_string(),
            bucket_name: "inspection-photos".to_string(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            max_retries: 3,
            retry_max_backoff_secs: 30,
        }
    }

    #[test]
    fn test_config_validation_rejects_empty_credentials() {
        let mut config = test_config();
        config.key_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_url() {
        let mut config = test_config();
        config.auth_base_url = "ftp://api.backblazeb2.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_decision_for_expired_token() {
        let err = StorageError::Api {
            status: 401,
            code: "expired_auth_token".to_string(),
            message: "token expired".to_string(),
        };
        assert_eq!(err.retry_decision(), RetryDecision::Reauthorize);
    }

    #[test]
    fn test_retry_decision_for_server_errors() {
        let err = StorageError::Api {
            status: 503,
            code: "service_unavailable".to_string(),
            message: "busy".to_string(),
        };
        assert_eq!(err.retry_decision(), RetryDecision::Retry);

        let err = StorageError::Api {
            status: 429,
            code: "too_many_requests".to_string(),
            message: "slow down".to_string(),
        };
        assert_eq!(err.retry_decision(), RetryDecision::Retry);

        let err = StorageError::Transport("connection reset".to_string());
        assert_eq!(err.retry_decision(), RetryDecision::Retry);
    }

    #[test]
    fn test_retry_decision_for_client_errors() {
        let err = StorageError::Api {
            status: 400,
            code: "bad_request".to_string(),
            message: "no".to_string(),
        };
        assert_eq!(err.retry_decision(), RetryDecision::NoRetry);
    }

    #[tokio::test]
    async fn test_in_memory_backend_roundtrip() {
        let storage = InMemoryPhotoStorage::new();

        let stored = storage
            .upload("inspections/abc/photo.jpg", "image/jpeg", b"jpeg-bytes")
            .await
            .unwrap();
        assert_eq!(stored.size, 9);
        assert!(storage.contains("inspections/abc/photo.jpg"));

        let url = storage.download_url("inspections/abc/photo.jpg").await.unwrap();
        assert_eq!(url, "memory://inspections/abc/photo.jpg");

        storage
            .delete(&stored.file_id, "inspections/abc/photo.jpg")
            .await
            .unwrap();
        assert!(!storage.contains("inspections/abc/photo.jpg"));
    }
}
