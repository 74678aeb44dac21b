use crate::progress::{ProgressCallback, TransferStage};
use crate::{StorageManager, key_to_local_path};
use session_core::prelude::*;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Manifests fetched by one category sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub category: AssetCategory,
    /// Remote keys, in download order.
    pub downloaded: Vec<String>,
}

impl<S: StorageBackend> StorageManager<S> {
    /// Replaces the local manifest cache of `category` with the manifests
    /// currently tagged for it in any bucket.
    ///
    /// The cache directory is wiped first, so manifests removed or renamed
    /// upstream never survive. Any failed download aborts the whole sync and
    /// leaves the cache partially populated until the next attempt.
    #[instrument(skip(self, progress), fields(category = %category))]
    pub async fn sync_manifests(
        &self,
        category: AssetCategory,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<SyncReport> {
        let dir = self.manifest_dir(category);
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;

        let mut downloaded = Vec::new();
        for bucket in self.storage.list_buckets().await? {
            for object in self.storage.list_objects(&bucket).await? {
                if !object.key.ends_with(MANIFEST_SUFFIX) {
                    continue;
                }

                let tag = match object.metadata {
                    Some(mut metadata) => metadata.remove(CATEGORY_METADATA_KEY),
                    None => self
                        .storage
                        .object_metadata(&bucket, &object.key)
                        .await?
                        .remove(CATEGORY_METADATA_KEY),
                };
                if tag.as_deref() != Some(category.tag()) {
                    continue;
                }

                let Some(relative) = key_to_local_path(&object.key) else {
                    warn!("Skipping manifest with unsafe key '{}' in {bucket}", object.key);
                    continue;
                };

                debug!("Fetching {} from {bucket}", object.key);
                self.fetch_to_file(
                    &bucket,
                    &object.key,
                    &dir.join(relative),
                    TransferStage::Manifest,
                    Some(object.size),
                    progress,
                )
                .await?;
                downloaded.push(object.key);
            }
        }

        info!("Synced {} manifests", downloaded.len());
        Ok(SyncReport {
            category,
            downloaded,
        })
    }

    /// Syncs every category independently, in registry order.
    ///
    /// A failing category does not stop the others; its error is returned in
    /// its slot. Authentication failures abort the whole run.
    pub async fn sync_all(
        &self,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<Vec<(AssetCategory, Result<SyncReport>)>> {
        let mut results = Vec::with_capacity(AssetCategory::ALL.len());
        for category in AssetCategory::ALL {
            match self.sync_manifests(category, progress).await {
                Err(AssetStoreError::NotAuthenticated(reason)) => {
                    return Err(AssetStoreError::NotAuthenticated(reason));
                }
                Err(e) => {
                    warn!("Sync of {category} failed: {e}");
                    results.push((category, Err(e)));
                }
                Ok(report) => results.push((category, Ok(report))),
            }
        }
        Ok(results)
    }
}
