use crate::error::*;

use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Object body, delivered in chunks.
pub type BlobStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// User metadata attached to an object.
pub type ObjectMetadata = HashMap<String, String>;

/// One entry of a bucket listing.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// `None` when the listing does not carry user metadata; use
    /// [`StorageBackend::object_metadata`] to fetch it.
    pub metadata: Option<ObjectMetadata>,
}

/// The remote object store the asset manager orchestrates.
///
/// Objects are addressed by bucket and key. Nothing is assumed about which
/// bucket holds which object.
pub trait StorageBackend: Send + Sync + 'static + Clone {
    fn list_buckets(&self) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;

    fn list_objects(
        &self,
        bucket: &str,
    ) -> impl Future<Output = Result<Vec<ObjectInfo>, StorageError>> + Send;

    fn object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<ObjectMetadata, StorageError>> + Send;

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<BlobStream, StorageError>> + Send;

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: ObjectMetadata,
        data: BlobStream,
        content_length: Option<u64>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Fails with [`StorageError::NotFound`] when there is no such object.
    fn delete_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Wraps an in-memory buffer as a single-chunk [`BlobStream`].
pub fn blob_stream_from_bytes(data: Bytes) -> BlobStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}
