//! # Session FileSystem Storage
//!
//! A local filesystem backend for the Session asset store.
//!
//! This crate implements the [`StorageBackend`] trait on top of a directory
//! tree: every top-level directory of the root is a bucket and every file
//! below it an object, keyed by its `/`-separated relative path. User
//! metadata lives in JSON sidecars under `<root>/.metadata/<bucket>/`.
//!
//! ## Features
//!
//! * **Atomic Writes**: objects are staged under `<root>/.staging` and renamed
//!   into place, so a listing never observes a partially written object.
//!
//! ## Usage
//!
//! ```no_run
//! use session_fs::FileSystemStorage;
//!
//! let storage = FileSystemStorage::new("./session_data");
//! ```

use bytes::Bytes;
use futures::StreamExt;
use session_core::prelude::*;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

const METADATA_DIR: &str = ".metadata";
const STAGING_DIR: &str = ".staging";

fn not_found_as(e: std::io::Error, what: &str) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(what.to_string())
    } else {
        StorageError::Io(e)
    }
}

/// Splits an object key into path components, refusing anything that could
/// leave the bucket directory.
fn key_to_relative(key: &str) -> Result<PathBuf, StorageError> {
    let relative = Path::new(key);
    let valid = !key.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    valid
        .then(|| relative.to_path_buf())
        .ok_or_else(|| StorageError::Generic(format!("Invalid object key: '{key}'")))
}

fn read_sidecar(path: &Path) -> ObjectMetadata {
    match std::fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|e| {
            warn!("Ignoring unreadable metadata sidecar {}: {e}", path.display());
            ObjectMetadata::new()
        }),
        Err(_) => ObjectMetadata::new(),
    }
}

/// Copies an object body into its staging file.
async fn write_body(file: &mut fs::File, mut data: BlobStream) -> std::io::Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = data.next().await {
        let chunk: Bytes = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[derive(Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
}

impl FileSystemStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { root: path.into() }
    }

    /// Creates an empty bucket; a no-op when it already exists.
    pub async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let path = self.bucket_path(bucket)?;
        fs::create_dir_all(path).await.map_err(StorageError::Io)
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if bucket.starts_with('.') || bucket.contains(['/', '\\']) || bucket.is_empty() {
            return Err(StorageError::Generic(format!("Invalid bucket name: '{bucket}'")));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.bucket_path(bucket)?.join(key_to_relative(key)?))
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root.join(METADATA_DIR).join(bucket).join(key_to_relative(key)?);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".meta");
        path.set_file_name(name);
        Ok(path)
    }

    fn staging_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root
            .join(STAGING_DIR)
            .join(format!("{bucket}__{}", key.replace('/', "__")))
    }

    async fn publish_staged(&self, staged: &Path, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(staged, path).await
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let path = self.bucket_path(bucket)?;
        match fs::metadata(&path).await {
            Ok(m) if m.is_dir() => Ok(path),
            Ok(_) => Err(StorageError::NotFound(bucket.to_string())),
            Err(e) => Err(not_found_as(e, bucket)),
        }
    }
}

impl StorageBackend for FileSystemStorage {
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        let mut buckets = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(buckets),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') && entry.file_type().await?.is_dir() {
                buckets.push(name);
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let bucket_dir = self.ensure_bucket(bucket).await?;
        let sidecar_dir = self.root.join(METADATA_DIR).join(bucket);

        let objects = tokio::task::spawn_blocking(move || -> Result<Vec<ObjectInfo>, StorageError> {
            let mut objects = Vec::new();
            for entry in WalkDir::new(&bucket_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| StorageError::Generic(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&bucket_dir)
                    .map_err(|e| StorageError::Generic(e.to_string()))?;
                let key = relative.to_string_lossy().replace('\\', "/");

                let mut sidecar = sidecar_dir.join(relative);
                let mut name = sidecar.file_name().unwrap_or_default().to_os_string();
                name.push(".meta");
                sidecar.set_file_name(name);

                objects.push(ObjectInfo {
                    key,
                    size: entry.metadata().map(|m| m.len()).unwrap_or(0),
                    metadata: Some(read_sidecar(&sidecar)),
                });
            }
            Ok(objects)
        })
        .await
        .map_err(|e| StorageError::Generic(format!("Listing task failed: {e}")))??;

        debug!("Listed {} objects", objects.len());
        Ok(objects)
    }

    async fn object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let path = self.object_path(bucket, key)?;
        fs::metadata(&path).await.map_err(|e| not_found_as(e, key))?;

        let sidecar = self.sidecar_path(bucket, key)?;
        match fs::read(&sidecar).await {
            Ok(data) => Ok(serde_json::from_slice(&data)
                .map_err(|e| StorageError::Generic(format!("Corrupt metadata for '{key}': {e}")))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ObjectMetadata::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<BlobStream, StorageError> {
        let path = self.object_path(bucket, key)?;
        let file = fs::File::open(&path).await.map_err(|e| not_found_as(e, key))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    #[instrument(skip(self, metadata, data))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: ObjectMetadata,
        data: BlobStream,
        _content_length: Option<u64>,
    ) -> Result<(), StorageError> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;
        let tmp_path = self.staging_path(bucket, key);

        if let Some(parent) = tmp_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&tmp_path).await?;
        let staged = write_body(&mut file, data).await;
        drop(file);

        let moved = match staged {
            Ok(written) => self.publish_staged(&tmp_path, &path).await.map(|()| written),
            Err(e) => Err(e),
        };
        let written = match moved {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(e));
            }
        };

        let sidecar = self.sidecar_path(bucket, key)?;
        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent).await?;
        }
        let encoded = serde_json::to_vec(&metadata)
            .map_err(|e| StorageError::Generic(format!("Failed to encode metadata: {e}")))?;
        fs::write(&sidecar, encoded).await?;

        debug!("Stored {written} bytes");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        fs::remove_file(&path).await.map_err(|e| not_found_as(e, key))?;

        let sidecar = self.sidecar_path(bucket, key)?;
        if let Err(e) = fs::remove_file(&sidecar).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove metadata sidecar {}: {e}", sidecar.display());
        }
        Ok(())
    }
}
