use crate::StorageManager;
use session_core::prelude::*;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

impl<S: StorageBackend> StorageManager<S> {
    /// Parses every manifest cached for `category`, ordered by file name.
    ///
    /// Manifests that cannot be read or parsed are returned as
    /// [`Asset::Invalid`] instead of failing the batch. A category that was
    /// never synced yields no assets.
    #[instrument(skip(self), fields(category = %category))]
    pub async fn load_assets(&self, category: AssetCategory) -> Result<Vec<Asset>> {
        let dir = self.manifest_dir(category);
        if !fs::try_exists(&dir).await? {
            debug!("No manifest cache at {}", dir.display());
            return Ok(Vec::new());
        }

        let mut assets = Vec::new();
        for path in manifest_files(&dir).await? {
            let asset = match fs::read(&path).await {
                Ok(data) => Asset::from_file_contents(&path, &data),
                Err(e) => Asset::Invalid {
                    path: path.clone(),
                    reason: e.to_string(),
                },
            };
            if let Asset::Invalid { reason, .. } = &asset {
                warn!("Malformed manifest {}: {reason}", path.display());
            }
            assets.push(asset);
        }
        Ok(assets)
    }

    /// [`load_assets`](Self::load_assets) for every category, in registry
    /// order.
    pub async fn load_all_assets(&self) -> Result<Vec<Asset>> {
        let mut assets = Vec::new();
        for category in AssetCategory::ALL {
            assets.extend(self.load_assets(category).await?);
        }
        Ok(assets)
    }

    /// Finds the bucket currently holding `key`.
    ///
    /// Scans every bucket listing on each call; nothing is cached between
    /// calls, so the cost grows with the total number of remote objects.
    pub async fn resolve_bucket(&self, key: &str) -> Result<String> {
        Ok(self.locate(key).await?.0)
    }

    /// Like [`resolve_bucket`](Self::resolve_bucket), also returning the
    /// listing entry.
    pub(crate) async fn locate(&self, key: &str) -> Result<(String, ObjectInfo)> {
        for bucket in self.storage.list_buckets().await? {
            let found = self
                .storage
                .list_objects(&bucket)
                .await?
                .into_iter()
                .find(|object| object.key == key);
            if let Some(object) = found {
                debug!("Resolved {key} to bucket {bucket}");
                return Ok((bucket, object));
            }
        }
        Err(AssetStoreError::RemoteObjectNotFound(key.to_string()))
    }
}

/// All `*.json` files below `dir`, ordered by file name, then by full path
/// for same-named manifests in different subdirectories.
async fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = dir.to_path_buf();
    let mut files = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file()
                && entry.file_name().to_string_lossy().ends_with(MANIFEST_SUFFIX)
            {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    })
    .await
    .map_err(std::io::Error::other)??;

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn manifests_are_ordered_by_file_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("community/nested")).unwrap();
        for file in [
            "zebra.json",
            "community/apple.json",
            "community/nested/mango.json",
            "community/readme.txt",
            "mango.json",
        ] {
            std::fs::write(root.join(file), "{}").unwrap();
        }

        let names: Vec<_> = manifest_files(root)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(
            names,
            vec![
                "community/apple.json",
                "community/nested/mango.json",
                "mango.json",
                "zebra.json",
            ]
        );
    }
}
