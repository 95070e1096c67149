//! Object storage for uploaded files.
//!
//! Objects live under `{prefix}/storage/uploads/` where the prefix names the
//! environment (`live` or `test`). Stored documents reference objects by
//! their storage path, which is the key without the environment prefix.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rocket::http::Status;
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::Config;
use crate::resp::problem::{problems, Problem};
use crate::util;

pub static UPLOAD_DIR: &str = "/storage/uploads/";
static ENVIRONMENTS: [&str; 2] = ["live", "test"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage path '{0}'")]
    InvalidPath(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Problem {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidPath(path) => problems::bad_request("Invalid storage path format")
                .insert_str("storagePath", path)
                .clone(),
            StorageError::Io(e) => {
                tracing::error!("object storage failure: {}", e);
                Problem::new_untyped(Status::InternalServerError, "Object storage failure")
                    .detail(e)
                    .clone()
            }
        }
    }
}

#[rocket::async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Returns `false` when there was no such object.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}

/// Bucket kept in a local directory. Keys map onto relative paths.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> LocalBucket {
        LocalBucket { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let plain = relative
            .components()
            .all(|it| matches!(it, Component::Normal(_)));
        if key.is_empty() || !plain {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[rocket::async_trait]
impl ObjectStorage for LocalBucket {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Path stored in documents, without the environment prefix.
    pub storage_path: String,
    pub url: String,
}

/// Extension of an uploaded file name, lower-cased. Defaults to `jpg`.
pub fn upload_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|it| it.rsplit_once('.'))
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|it| !it.is_empty() && it.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string())
}

/// Environment prefixed storage used by the file endpoints.
#[derive(Clone)]
pub struct Bucket {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
    public_url: String,
}

impl Bucket {
    pub fn new(
        storage: impl ObjectStorage + 'static,
        prefix: impl ToString,
        public_url: impl ToString,
    ) -> Bucket {
        Bucket {
            storage: Arc::new(storage),
            prefix: prefix.to_string(),
            public_url: public_url.to_string().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Bucket {
        Bucket::new(
            LocalBucket::new(&config.storage_root),
            &config.storage_prefix,
            &config.storage_public_url,
        )
    }

    /// Object key for a storage path. Paths must point into the upload
    /// directory, optionally with an environment prefix already applied.
    pub fn object_key(&self, storage_path: &str) -> Result<String, StorageError> {
        let invalid = || StorageError::InvalidPath(storage_path.to_string());

        let key = if storage_path.starts_with(UPLOAD_DIR) {
            format!("{}{}", self.prefix, storage_path)
        } else {
            let prefixed = ENVIRONMENTS.iter().any(|env| {
                storage_path
                    .strip_prefix('/')
                    .and_then(|it| it.strip_prefix(env))
                    .map(|it| it.starts_with(UPLOAD_DIR))
                    .unwrap_or(false)
            });
            if !prefixed {
                return Err(invalid());
            }
            storage_path[1..].to_string()
        };

        if key.split('/').any(|it| it == ".." || it == ".") {
            return Err(invalid());
        }
        Ok(key)
    }

    pub async fn upload(
        &self,
        file_name: Option<&str>,
        data: Vec<u8>,
    ) -> Result<UploadedFile, StorageError> {
        let name = format!(
            "image{}-{}.{}",
            util::random_token(7),
            Utc::now().timestamp_millis(),
            upload_extension(file_name)
        );
        let storage_path = format!("{}{}", UPLOAD_DIR, name);
        let key = format!("{}{}", self.prefix, storage_path);

        self.storage.put(&key, data).await?;
        tracing::info!("uploaded {}", key);

        Ok(UploadedFile {
            url: format!("{}/{}", self.public_url, key),
            storage_path,
        })
    }

    /// Deletes the object behind `storage_path` and returns its key.
    pub async fn delete(&self, storage_path: &str) -> Result<String, StorageError> {
        let key = self.object_key(storage_path)?;
        if !self.storage.delete(&key).await? {
            tracing::warn!("object {} was already gone", key);
        }
        Ok(key)
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bucket({})", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(root: &Path) -> Bucket {
        Bucket::new(LocalBucket::new(root), "test", "http://cdn.local/")
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("tutordesk-bucket-{}", util::random_token(8)))
    }

    #[test]
    fn extensions_default_to_jpg() {
        assert_eq!(upload_extension(Some("Scan.PDF")), "pdf");
        assert_eq!(upload_extension(Some("archive.tar.gz")), "gz");
        assert_eq!(upload_extension(Some("noext")), "jpg");
        assert_eq!(upload_extension(None), "jpg");
    }

    #[test]
    fn storage_paths_are_validated() {
        let bucket = bucket(&temp_root());

        assert_eq!(
            bucket.object_key("/storage/uploads/a.jpg").unwrap(),
            "test/storage/uploads/a.jpg"
        );
        assert_eq!(
            bucket.object_key("/live/storage/uploads/a.jpg").unwrap(),
            "live/storage/uploads/a.jpg"
        );
        assert!(bucket.object_key("/etc/passwd").is_err());
        assert!(bucket.object_key("storage/uploads/a.jpg").is_err());
        assert!(bucket.object_key("/storage/uploads/../../x").is_err());
        assert!(bucket.object_key("/prod/storage/uploads/a.jpg").is_err());
    }

    #[rocket::async_test]
    async fn upload_then_delete() {
        let root = temp_root();
        let bucket = bucket(&root);

        let uploaded = bucket
            .upload(Some("homework.PNG"), b"png".to_vec())
            .await
            .unwrap();
        assert!(uploaded.storage_path.starts_with("/storage/uploads/image"));
        assert!(uploaded.storage_path.ends_with(".png"));
        assert_eq!(
            uploaded.url,
            format!("http://cdn.local/test{}", uploaded.storage_path)
        );

        let key = format!("test{}", uploaded.storage_path);
        assert!(root.join(&key).exists());

        assert_eq!(bucket.delete(&uploaded.storage_path).await.unwrap(), key);
        assert!(!root.join(&key).exists());

        // Deleting again is not an error.
        bucket.delete(&uploaded.storage_path).await.unwrap();
        let _ = std::fs::remove_dir_all(root);
    }
}
