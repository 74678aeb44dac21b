use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::BytesMut;
use futures::StreamExt;
use opendal::{ErrorKind, Operator, services};
use session_core::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Size of each ranged read when streaming an object.
const READ_CHUNK_SIZE: usize = 256 * 1024;

fn opendal_error(what: &str, e: opendal::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(what.to_string()),
        ErrorKind::PermissionDenied => StorageError::Unauthorized(format!("{what}: {e}")),
        _ => StorageError::Generic(format!("OpenDAL error on {what}: {e}")),
    }
}

/// A fixed set of named buckets, each served by its own OpenDAL operator.
///
/// OpenDAL has no notion of enumerating buckets, so the set is given up
/// front and [`StorageBackend::list_buckets`] returns it in name order.
#[derive(Clone)]
pub struct OpendalStorage {
    buckets: Arc<BTreeMap<String, Operator>>,
}

impl OpendalStorage {
    /// Create a new storage from `(bucket name, operator)` pairs.
    /// Each Operator can be configured for any supported backend e.g., s3, fs, gcs, etc.
    pub fn new<N: Into<String>>(buckets: impl IntoIterator<Item = (N, Operator)>) -> Self {
        Self {
            buckets: Arc::new(
                buckets
                    .into_iter()
                    .map(|(name, op)| (name.into(), op))
                    .collect(),
            ),
        }
    }

    /// Google Cloud Storage buckets authenticated with a service-account key.
    pub fn gcs(key: &ServiceAccountKey, bucket_names: &[String]) -> Result<Self, AssetStoreError> {
        let credential = STANDARD.encode(key.raw_json());
        let buckets = bucket_names
            .iter()
            .map(|name| {
                let builder = services::Gcs::default().bucket(name).credential(&credential);
                Operator::new(builder)
                    .map(|op| (name.clone(), op.finish()))
                    .map_err(|e| AssetStoreError::CredentialsMalformed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(buckets))
    }

    /// Exchanges a service-account key for GCS-backed storage.
    pub fn from_credentials(
        credentials: &Credentials,
        bucket_names: &[String],
    ) -> Result<Self, AssetStoreError> {
        match credentials {
            Credentials::ServiceAccount(key) => Self::gcs(key, bucket_names),
            Credentials::AccessKey(_) => Err(AssetStoreError::CredentialsMalformed(
                "GCS operators need a service-account key".into(),
            )),
        }
    }

    fn operator(&self, bucket: &str) -> Result<&Operator, StorageError> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NotFound(bucket.to_string()))
    }
}

impl StorageBackend for OpendalStorage {
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.buckets.keys().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let op = self.operator(bucket)?;
        let entries = op
            .list_with("")
            .recursive(true)
            .await
            .map_err(|e| opendal_error(bucket, e))?;

        let objects: Vec<ObjectInfo> = entries
            .into_iter()
            .filter(|entry| entry.metadata().mode().is_file())
            .map(|entry| ObjectInfo {
                size: entry.metadata().content_length(),
                metadata: entry.metadata().user_metadata().cloned(),
                key: entry.path().to_string(),
            })
            .collect();

        debug!("Listed {} objects", objects.len());
        Ok(objects)
    }

    async fn object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let meta = self
            .operator(bucket)?
            .stat(key)
            .await
            .map_err(|e| opendal_error(key, e))?;
        Ok(meta.user_metadata().cloned().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<BlobStream, StorageError> {
        let op = self.operator(bucket)?;
        let size = op
            .stat(key)
            .await
            .map_err(|e| opendal_error(key, e))?
            .content_length();

        let stream = op
            .reader_with(key)
            .chunk(READ_CHUNK_SIZE)
            .await
            .map_err(|e| opendal_error(key, e))?
            .into_bytes_stream(0..size)
            .await
            .map_err(|e| opendal_error(key, e))?;
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, metadata, data))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: ObjectMetadata,
        mut data: BlobStream,
        content_length: Option<u64>,
    ) -> Result<(), StorageError> {
        let op = self.operator(bucket)?;

        let mut buffer = BytesMut::with_capacity(content_length.unwrap_or(0) as usize);
        while let Some(chunk) = data.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        let write = op.write_with(key, buffer.freeze());
        let result = if op.info().full_capability().write_with_user_metadata {
            write.user_metadata(metadata).await
        } else {
            if !metadata.is_empty() {
                warn!("Service does not store user metadata, object will be untagged");
            }
            write.await
        };
        result.map_err(|e| opendal_error(key, e))?;

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let op = self.operator(bucket)?;
        if !op.exists(key).await.map_err(|e| opendal_error(key, e))? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        op.delete(key).await.map_err(|e| opendal_error(key, e))
    }
}
