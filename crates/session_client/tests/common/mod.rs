//! Shared test utilities: an in-memory backend that records every call.
#![allow(dead_code)]

use bytes::Bytes;
use futures::TryStreamExt;
use session_core::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use walkdir::WalkDir;

struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

#[derive(Default)]
struct Inner {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    calls: Vec<String>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    deny_access: bool,
    metadata_in_listing: bool,
}

#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                metadata_in_listing: true,
                ..Default::default()
            })),
        }
    }

    /// Listings without user metadata, the way S3 lists objects.
    pub fn without_listing_metadata() -> Self {
        let storage = Self::new();
        storage.lock().metadata_in_listing = false;
        storage
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn record(&self, call: String) -> MutexGuard<'_, Inner> {
        let mut inner = self.lock();
        inner.calls.push(call);
        inner
    }

    pub fn add_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8], category: Option<&str>) {
        let metadata = category
            .map(|c| ObjectMetadata::from([(CATEGORY_METADATA_KEY.to_string(), c.to_string())]))
            .unwrap_or_default();
        self.lock().buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                metadata,
            },
        );
    }

    pub fn fail_reads_of(&self, key: &str) {
        self.lock().failing_reads.insert(key.to_string());
    }

    pub fn fail_writes_of(&self, key: &str) {
        self.lock().failing_writes.insert(key.to_string());
    }

    pub fn deny_access(&self) {
        self.lock().deny_access = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .buckets
            .get(bucket)?
            .get(key)
            .map(|o| o.data.clone())
    }

    pub fn metadata(&self, bucket: &str, key: &str) -> Option<ObjectMetadata> {
        self.lock()
            .buckets
            .get(bucket)?
            .get(key)
            .map(|o| o.metadata.clone())
    }
}

fn check_access(inner: &Inner) -> Result<(), StorageError> {
    if inner.deny_access {
        Err(StorageError::Unauthorized("access denied".into()))
    } else {
        Ok(())
    }
}

impl StorageBackend for MemoryStorage {
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        let inner = self.record("list_buckets".into());
        check_access(&inner)?;
        Ok(inner.buckets.keys().cloned().collect())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let inner = self.record(format!("list_objects {bucket}"));
        check_access(&inner)?;
        let objects = inner
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NotFound(bucket.to_string()))?;
        Ok(objects
            .iter()
            .map(|(key, o)| ObjectInfo {
                key: key.clone(),
                size: o.data.len() as u64,
                metadata: inner.metadata_in_listing.then(|| o.metadata.clone()),
            })
            .collect())
    }

    async fn object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let inner = self.record(format!("object_metadata {bucket}/{key}"));
        check_access(&inner)?;
        inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.metadata.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<BlobStream, StorageError> {
        let inner = self.record(format!("get_object {bucket}/{key}"));
        check_access(&inner)?;
        let data = inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let half = data.len() / 2;
        let chunks = if inner.failing_reads.contains(key) {
            vec![
                Ok(data.slice(..half)),
                Err(std::io::Error::other("connection reset")),
            ]
        } else {
            vec![Ok(data.slice(..half)), Ok(data.slice(half..))]
        };
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: ObjectMetadata,
        data: BlobStream,
        _content_length: Option<u64>,
    ) -> Result<(), StorageError> {
        {
            let inner = self.record(format!("put_object {bucket}/{key}"));
            check_access(&inner)?;
            if inner.failing_writes.contains(key) {
                return Err(StorageError::Generic("write rejected".into()));
            }
            if !inner.buckets.contains_key(bucket) {
                return Err(StorageError::NotFound(bucket.to_string()));
            }
        }

        let chunks: Vec<Bytes> = data.try_collect().await?;
        let data = Bytes::from(chunks.concat());
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), StoredObject { data, metadata });
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut inner = self.record(format!("delete_object {bucket}/{key}"));
        check_access(&inner)?;
        inner
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

pub fn manifest_json(name: &str, category: &str, asset_name: &str, thumbnail: &str) -> String {
    serde_json::json!({
        "Name": name,
        "Description": format!("{name} description"),
        "Author": "tester",
        "AssetName": asset_name,
        "Thumbnail": thumbnail,
        "Category": category,
        "Version": "1.0",
    })
    .to_string()
}

/// Files directly or indirectly below `dir`, relative and `/`-separated.
pub fn files_under(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}
