use crate::progress::{ProgressCallback, TransferStage, report};
use crate::validate::validate_manifest;
use crate::StorageManager;
use futures::{StreamExt, TryStreamExt};
use session_core::prelude::*;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The destination already existed and overwriting was not requested.
    Skipped,
    Transferred { bytes: u64 },
}

impl<S: StorageBackend> StorageManager<S> {
    /// Downloads the payload of `asset` to `destination`.
    ///
    /// An existing destination is left untouched unless `overwrite` is set,
    /// in which case no remote call is made at all. A failure mid-stream
    /// leaves the partial file on disk.
    pub async fn download_asset(
        &self,
        asset: &AssetRecord,
        destination: impl AsRef<Path>,
        overwrite: bool,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<TransferOutcome> {
        self.download_key(
            &asset.asset_name,
            destination.as_ref(),
            overwrite,
            TransferStage::Payload,
            progress,
        )
        .await
    }

    /// Same as [`download_asset`](Self::download_asset), for the thumbnail.
    pub async fn download_thumbnail(
        &self,
        asset: &AssetRecord,
        destination: impl AsRef<Path>,
        overwrite: bool,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<TransferOutcome> {
        self.download_key(
            &asset.thumbnail,
            destination.as_ref(),
            overwrite,
            TransferStage::Thumbnail,
            progress,
        )
        .await
    }

    #[instrument(skip(self, progress))]
    async fn download_key(
        &self,
        key: &str,
        destination: &Path,
        overwrite: bool,
        stage: TransferStage,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<TransferOutcome> {
        if !overwrite && fs::try_exists(destination).await? {
            debug!("Destination exists, skipping");
            return Ok(TransferOutcome::Skipped);
        }

        let (bucket, object) = self.locate(key).await?;
        let bytes = self
            .fetch_to_file(&bucket, key, destination, stage, Some(object.size), progress)
            .await?;

        info!("Downloaded {key} from {bucket} ({bytes} bytes)");
        Ok(TransferOutcome::Transferred { bytes })
    }

    /// Streams one object into a local file, creating parent directories.
    pub(crate) async fn fetch_to_file(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
        stage: TransferStage,
        total_bytes: Option<u64>,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<u64> {
        let mut stream = self
            .storage
            .get_object(bucket, key)
            .await
            .map_err(|e| AssetStoreError::transfer(key, e))?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(destination)
            .await
            .map_err(|e| AssetStoreError::transfer(key, e.into()))?;

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Partial content stays on disk.
                    let _ = file.flush().await;
                    return Err(AssetStoreError::transfer(key, e.into()));
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| AssetStoreError::transfer(key, e.into()))?;
            written += chunk.len() as u64;
            report(progress, key, stage, written, total_bytes);
        }
        file.flush()
            .await
            .map_err(|e| AssetStoreError::transfer(key, e.into()))?;

        Ok(written)
    }

    /// Uploads the manifest, thumbnail and payload of an asset to `bucket`,
    /// in that order, each tagged with the asset's category.
    ///
    /// The manifest is validated before any remote call. Objects uploaded
    /// before a failing one stay uploaded.
    #[instrument(skip(self, progress), fields(category))]
    pub async fn upload_asset(
        &self,
        manifest_path: &Path,
        thumbnail_path: &Path,
        payload_path: &Path,
        bucket: &str,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<AssetRecord> {
        let record = validate_manifest(manifest_path).await.into_result()?;
        let manifest_key = manifest_key(manifest_path)?;
        tracing::Span::current().record("category", record.category.tag());

        let metadata = ObjectMetadata::from([(
            CATEGORY_METADATA_KEY.to_string(),
            record.category.tag().to_string(),
        )]);

        let uploads = [
            (TransferStage::Manifest, manifest_key.as_str(), manifest_path),
            (TransferStage::Thumbnail, record.thumbnail.as_str(), thumbnail_path),
            (TransferStage::Payload, record.asset_name.as_str(), payload_path),
        ];
        for (stage, key, path) in uploads {
            self.put_file(bucket, key, path, metadata.clone(), stage, progress)
                .await?;
        }

        info!("Uploaded '{}' to {bucket}", record.name);
        Ok(record)
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: ObjectMetadata,
        stage: TransferStage,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<()> {
        let file = File::open(path)
            .await
            .map_err(|e| AssetStoreError::transfer(key, e.into()))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| AssetStoreError::transfer(key, e.into()))?
            .len();

        // Chunk sizes travel over a channel: the body stream is owned by the
        // backend and cannot borrow the callback.
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let body = ReaderStream::new(file).inspect_ok(move |chunk| {
            let _ = tx.send(chunk.len() as u64);
        });

        let upload = self
            .storage
            .put_object(bucket, key, metadata, Box::pin(body), Some(total));
        let observe = async {
            let mut sent = 0u64;
            while let Some(n) = rx.recv().await {
                sent += n;
                report(progress, key, stage, sent, Some(total));
            }
        };
        let (result, ()) = tokio::join!(upload, observe);
        result.map_err(|e| AssetStoreError::transfer(key, e))?;

        debug!("Uploaded {key} ({total} bytes)");
        Ok(())
    }

    /// Deletes the manifest, payload and thumbnail objects of an asset, in
    /// that order.
    ///
    /// Every deletion is attempted regardless of the others; failures are
    /// collected into [`AssetStoreError::DeleteIncomplete`] and nothing is
    /// restored.
    #[instrument(skip(self, asset))]
    pub async fn delete_asset(
        &self,
        bucket: &str,
        manifest_key: &str,
        asset: &AssetRecord,
    ) -> Result<()> {
        let mut failures = Vec::new();
        for key in [manifest_key, asset.asset_name.as_str(), asset.thumbnail.as_str()] {
            match self.storage.delete_object(bucket, key).await {
                Ok(()) => debug!("Deleted {key}"),
                Err(StorageError::Unauthorized(reason)) => {
                    return Err(AssetStoreError::NotAuthenticated(reason));
                }
                Err(error) => {
                    warn!("Failed to delete {key}: {error}");
                    failures.push(DeleteFailure {
                        key: key.to_string(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            info!("Deleted '{}' from {bucket}", asset.name);
            Ok(())
        } else {
            Err(AssetStoreError::DeleteIncomplete(failures))
        }
    }

    /// Deletes the asset described by a local manifest file, whose file name
    /// is taken as the remote manifest key.
    pub async fn delete_asset_by_manifest(&self, bucket: &str, manifest_path: &Path) -> Result<()> {
        let record = validate_manifest(manifest_path).await.into_result()?;
        let key = manifest_key(manifest_path)?;
        self.delete_asset(bucket, &key, &record).await
    }
}

fn manifest_key(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            AssetStoreError::InvalidManifest(format!("'{}' has no file name", path.display()))
        })
}
