use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials as SdkCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::BytesMut;
use futures::StreamExt;
use session_core::prelude::*;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, instrument};

pub const ENDPOINT_ENV: &str = "SESSION_S3_ENDPOINT";
pub const REGION_ENV: &str = "SESSION_S3_REGION";
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings that do not come from the credentials file.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom S3 API endpoint, e.g. `https://storage.googleapis.com` for GCS
    /// interoperability keys. `None` targets AWS.
    pub endpoint_url: Option<String>,
    pub region: String,
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            region: DEFAULT_REGION.to_string(),
            force_path_style: false,
        }
    }
}

impl S3Config {
    /// Reads `SESSION_S3_ENDPOINT` and `SESSION_S3_REGION`. Custom endpoints
    /// are addressed path-style.
    pub fn from_env() -> Self {
        let endpoint_url = std::env::var(ENDPOINT_ENV).ok().filter(|v| !v.is_empty());
        Self {
            force_path_style: endpoint_url.is_some(),
            endpoint_url,
            region: std::env::var(REGION_ENV).unwrap_or_else(|_| DEFAULT_REGION.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Exchanges an access key pair for a connected client.
    pub fn from_credentials(
        credentials: &Credentials,
        config: &S3Config,
    ) -> Result<Self, AssetStoreError> {
        let Credentials::AccessKey(keys) = credentials else {
            return Err(AssetStoreError::CredentialsMalformed(
                "service-account keys cannot sign S3 requests, an access key pair is required"
                    .into(),
            ));
        };

        let provider = SdkCredentials::new(
            &keys.access_key_id,
            &keys.secret_access_key,
            None,
            None,
            "session-credentials-file",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(provider)
            .force_path_style(config.force_path_style);
        builder.set_endpoint_url(config.endpoint_url.clone());

        Ok(Self::new(Client::from_conf(builder.build())))
    }
}

/// Maps an SDK failure onto the backend error taxonomy.
fn sdk_error<E>(what: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(ctx) = &err {
        match ctx.raw().status().as_u16() {
            401 | 403 => {
                return StorageError::Unauthorized(format!(
                    "{what}: {}",
                    DisplayErrorContext(&err)
                ));
            }
            404 => return StorageError::NotFound(what.to_string()),
            _ => {}
        }
    }
    error!("S3 error on {what}: {}", DisplayErrorContext(&err));
    StorageError::Generic(format!("S3 error on {what}: {}", DisplayErrorContext(&err)))
}

impl StorageBackend for S3Storage {
    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| sdk_error("ListBuckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    /// S3 listings carry no user metadata, so every entry has
    /// `metadata: None`.
    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| sdk_error(bucket, e))?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|key| ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    metadata: None,
                })
            }));

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!("Listed {} objects", objects.len());
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StorageError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(key, e))?;

        Ok(output.metadata().cloned().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<BlobStream, StorageError> {
        debug!("Reading object from S3...");
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(key, e))?;

        Ok(Box::pin(ReaderStream::new(output.body.into_async_read())))
    }

    /// Single-part upload; the body is buffered because S3 needs its length
    /// up front.
    #[instrument(skip(self, metadata, data))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: ObjectMetadata,
        mut data: BlobStream,
        content_length: Option<u64>,
    ) -> Result<(), StorageError> {
        let mut buffer = BytesMut::with_capacity(content_length.unwrap_or(0) as usize);
        while let Some(chunk) = data.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        let length = buffer.len();

        debug!("Uploading {length} bytes to S3...");
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_metadata(Some(metadata))
            .content_length(length as i64)
            .body(ByteStream::from(buffer.freeze()))
            .send()
            .await
            .map_err(|e| sdk_error(key, e))?;

        debug!("Upload successful");
        Ok(())
    }

    /// S3 deletes are idempotent, so existence is checked first to report
    /// missing objects.
    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(key, e))?;

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(key, e))?;

        debug!("Deleted");
        Ok(())
    }
}
