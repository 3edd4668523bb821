use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs; // Use tokio::fs for async file operations

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Storage API error: {0}")]
    Http(String),
    #[error("Unknown storage error: {0}")]
    Other(String),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Durable binary storage holding published archives.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, returning the stored size in bytes.
    /// Keys are never overwritten by the export pipeline.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> ObjectStoreResult<u64>;

    /// Produce a time-limited read link for an existing object.
    async fn create_signed_url(&self, key: &str, expires_in: Duration) -> ObjectStoreResult<String>;

    /// List object keys starting with `prefix`, sorted ascending.
    async fn list(&self, prefix: &str) -> ObjectStoreResult<Vec<String>>;
}

/// Split a key into safe path components.
fn key_components(key: &str) -> ObjectStoreResult<Vec<&str>> {
    let components: Vec<&str> = key.split('/').collect();
    let invalid = components.iter().any(|c| {
        c.is_empty() || *c == "." || *c == ".." || c.contains('\\')
    });
    if key.is_empty() || invalid {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(components)
}

// --- Local Object Store Implementation ---

/// Directory-backed store. Signed URLs point at `public_base_url` and carry an
/// expiry plus a SHA-256 signature over the key, checked by `verify_signed_url`.
pub struct LocalObjectStore {
    base_path: PathBuf,
    public_base_url: String,
    signing_secret: String,
}

impl LocalObjectStore {
    /// Creates the store, ensuring the base directory exists.
    pub fn new(base_path_str: &str, public_base_url: &str, signing_secret: &str) -> io::Result<Self> {
        let base_path = PathBuf::from(base_path_str);
        std::fs::create_dir_all(&base_path)?;

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_secret: signing_secret.to_string(),
        })
    }

    fn absolute_path(&self, key: &str) -> ObjectStoreResult<PathBuf> {
        let mut path = self.base_path.clone();
        for component in key_components(key)? {
            path.push(component);
        }
        Ok(path)
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check a signature handed out by `create_signed_url` at time `now` (unix seconds).
    pub fn verify_signed_url(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        now <= expires && self.signature(key, expires) == signature
    }

    /// Read a stored object back.
    pub async fn read(&self, key: &str) -> ObjectStoreResult<Vec<u8>> {
        let path = self.absolute_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ObjectStoreError::NotFound(key.to_string())),
            Err(e) => Err(ObjectStoreError::Io(e)),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: &str) -> ObjectStoreResult<u64> {
        let absolute_path = self.absolute_path(key)?;
        let parent_dir = absolute_path
            .parent()
            .ok_or_else(|| ObjectStoreError::Other("Invalid path generated, no parent directory".to_string()))?;

        fs::create_dir_all(parent_dir).await?;

        if fs::metadata(&absolute_path).await.is_ok() {
            return Err(ObjectStoreError::Other(format!("Object already exists: {}", key)));
        }

        let size = data.len() as u64;
        fs::write(&absolute_path, data).await?;
        Ok(size)
    }

    async fn create_signed_url(&self, key: &str, expires_in: Duration) -> ObjectStoreResult<String> {
        let absolute_path = self.absolute_path(key)?;
        match fs::metadata(&absolute_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(ObjectStoreError::Io(e)),
        }

        let ttl = i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl);
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.public_base_url,
            encoded_key,
            expires,
            self.signature(key, expires)
        ))
    }

    async fn list(&self, prefix: &str) -> ObjectStoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending: Vec<PathBuf> = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ObjectStoreError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Some(key) = relative_key(&self.base_path, &path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn relative_key(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    parts.map(|p| p.join("/"))
}

// --- HTTP Storage API Implementation ---

/// Client for a bucket-oriented storage REST API
/// (`/object/{bucket}/{key}`, `/object/sign/{bucket}/{key}`, `/object/list/{bucket}`).
pub struct ApiObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
}

impl ApiObjectStore {
    pub fn new(base_url: &str, bucket: &str, api_key: &str) -> ObjectStoreResult<Self> {
        if bucket.is_empty() {
            return Err(ObjectStoreError::Configuration("bucket name is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(120)) // large archives
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ObjectStoreError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn object_url(&self, action: Option<&str>, key: &str) -> String {
        match action {
            Some(action) => format!("{}/object/{}/{}/{}", self.base_url, action, self.bucket, key),
            None => format!("{}/object/{}/{}", self.base_url, self.bucket, key),
        }
    }

    async fn error_from_response(response: reqwest::Response) -> ObjectStoreError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to get error details".to_string());
        if status == reqwest::StatusCode::NOT_FOUND {
            ObjectStoreError::NotFound(error_text)
        } else {
            ObjectStoreError::Http(format!("Server returned error {}: {}", status, error_text))
        }
    }
}

#[async_trait]
impl ObjectStore for ApiObjectStore {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> ObjectStoreResult<u64> {
        key_components(key)?;
        let size = data.len() as u64;
        let response = self
            .client
            .post(self.object_url(None, key))
            .header("Authorization", self.auth_header())
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Http(format!("Failed to upload {}: {}", key, e)))?;

        if response.status().is_success() {
            Ok(size)
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    async fn create_signed_url(&self, key: &str, expires_in: Duration) -> ObjectStoreResult<String> {
        key_components(key)?;
        let response = self
            .client
            .post(self.object_url(Some("sign"), key))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Http(format!("Failed to sign {}: {}", key, e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let signed = response
            .json::<SignedUrlResponse>()
            .await
            .map_err(|e| ObjectStoreError::Http(format!("Failed to parse sign response: {}", e)))?;

        if signed.signed_url.starts_with("http") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}{}", self.base_url, signed.signed_url))
        }
    }

    async fn list(&self, prefix: &str) -> ObjectStoreResult<Vec<String>> {
        let folder = prefix.trim_end_matches('/');
        let response = self
            .client
            .post(format!("{}/object/list/{}", self.base_url, self.bucket))
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({
                "prefix": folder,
                "limit": 1000,
                "sortBy": { "column": "name", "order": "asc" }
            }))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Http(format!("Failed to list {}: {}", prefix, e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let objects = response
            .json::<Vec<ListedObject>>()
            .await
            .map_err(|e| ObjectStoreError::Http(format!("Failed to parse list response: {}", e)))?;

        let mut keys: Vec<String> = objects
            .into_iter()
            .map(|o| format!("{}/{}", folder, o.name))
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
