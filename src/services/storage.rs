//! Object storage
//!
//! Uploaded avatars and news covers are stored under a generated key; the
//! public URL is the configured domain prefix followed by that key.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use data_encoding::BASE64URL;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageDriver};

type HmacSha1 = Hmac<Sha1>;

/// Lifetime of a Qiniu upload token
const UPLOAD_TOKEN_TTL_SECONDS: i64 = 3600;

/// Stores raw bytes and returns the key they were stored under
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, data: Vec<u8>) -> Result<String>;
}

/// Build the storage backend selected in configuration
pub async fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>> {
    match config.driver {
        StorageDriver::Local => Ok(Arc::new(LocalStorage::new(config.path.clone()).await?)),
        StorageDriver::Qiniu => Ok(Arc::new(QiniuStorage::new(config)?)),
    }
}

/// Files written into a local directory, named by random key
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create upload directory {}", root.display()))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(&self, data: Vec<u8>) -> Result<String> {
        let key = Uuid::new_v4().simple().to_string();
        fs::write(self.root.join(&key), &data)
            .await
            .context("Failed to save uploaded file")?;
        tracing::debug!("Stored {} bytes as {}", data.len(), key);
        Ok(key)
    }
}

#[derive(Debug, Serialize)]
struct PutPolicy<'a> {
    scope: &'a str,
    deadline: i64,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    key: Option<String>,
    hash: Option<String>,
    error: Option<String>,
}

/// Qiniu cloud storage; keys are assigned by Qiniu from the content hash
pub struct QiniuStorage {
    client: reqwest::Client,
    access_key: String,
    secret_key: String,
    bucket: String,
    upload_url: String,
}

impl std::fmt::Debug for QiniuStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QiniuStorage")
            .field("bucket", &self.bucket)
            .field("upload_url", &self.upload_url)
            .finish_non_exhaustive()
    }
}

impl QiniuStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        if config.access_key.is_empty() || config.secret_key.is_empty() {
            bail!("Qiniu storage requires access_key and secret_key");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            bucket: config.bucket.clone(),
            upload_url: config.upload_url.clone(),
        })
    }

    /// `access_key:base64url(hmac_sha1(policy)):policy`
    fn upload_token(&self, deadline: i64) -> Result<String> {
        let policy = serde_json::to_vec(&PutPolicy {
            scope: &self.bucket,
            deadline,
        })
        .context("Failed to encode put policy")?;
        let encoded_policy = BASE64URL.encode(&policy);

        let mut mac = HmacSha1::new_from_slice(self.secret_key.as_bytes())
            .context("Invalid Qiniu secret key")?;
        mac.update(encoded_policy.as_bytes());
        let sign = BASE64URL.encode(&mac.finalize().into_bytes());

        Ok(format!("{}:{}:{}", self.access_key, sign, encoded_policy))
    }
}

#[async_trait]
impl ObjectStorage for QiniuStorage {
    async fn upload(&self, data: Vec<u8>) -> Result<String> {
        let token = self.upload_token(Utc::now().timestamp() + UPLOAD_TOKEN_TTL_SECONDS)?;

        let form = reqwest::multipart::Form::new()
            .text("token", token)
            .part("file", reqwest::multipart::Part::bytes(data).file_name("upload"));

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach object storage")?;

        let status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .context("Failed to parse object storage response")?;

        if !status.is_success() {
            bail!(
                "Object storage rejected upload ({}): {}",
                status,
                body.error.unwrap_or_default()
            );
        }

        body.key
            .or(body.hash)
            .context("Object storage response carried no key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn qiniu_config() -> StorageConfig {
        StorageConfig {
            driver: StorageDriver::Qiniu,
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            bucket: "ihome".to_string(),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn test_local_storage_writes_file() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("uploads")).await.unwrap();

        let key = storage.upload(b"avatar bytes".to_vec()).await.unwrap();
        assert_eq!(key.len(), 32);

        let stored = std::fs::read(dir.path().join("uploads").join(&key)).unwrap();
        assert_eq!(stored, b"avatar bytes");
    }

    #[tokio::test]
    async fn test_local_storage_keys_are_unique() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).await.unwrap();

        let a = storage.upload(b"same".to_vec()).await.unwrap();
        let b = storage.upload(b"same".to_vec()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_create_storage_local() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            path: dir.path().join("files"),
            ..StorageConfig::default()
        };
        let storage = create_storage(&config).await.unwrap();
        assert!(storage.upload(vec![1, 2, 3]).await.is_ok());
    }

    #[test]
    fn test_qiniu_requires_keys() {
        let config = StorageConfig {
            secret_key: String::new(),
            ..qiniu_config()
        };
        assert!(QiniuStorage::new(&config).is_err());
    }

    #[test]
    fn test_upload_token_layout() {
        let storage = QiniuStorage::new(&qiniu_config()).unwrap();
        let token = storage.upload_token(1_520_000_000).unwrap();

        let parts: Vec<&str> = token.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ak");

        let policy = BASE64URL.decode(parts[2].as_bytes()).unwrap();
        let policy: serde_json::Value = serde_json::from_slice(&policy).unwrap();
        assert_eq!(policy["scope"], "ihome");
        assert_eq!(policy["deadline"], 1_520_000_000);

        let mut mac = HmacSha1::new_from_slice(b"sk").unwrap();
        mac.update(parts[2].as_bytes());
        let expected = BASE64URL.encode(&mac.finalize().into_bytes());
        assert_eq!(parts[1], expected);
    }
}
