//! # Session Asset Client
//!
//! Orchestration over a [`StorageBackend`]: mirrors the remote manifests of a
//! category into a local cache, turns them into [`Asset`]s, and moves asset
//! payloads and thumbnails between the local disk and whichever bucket holds
//! them.
//!
//! ```no_run
//! use session_client::StorageManager;
//! use session_core::prelude::*;
//! use session_fs::FileSystemStorage;
//!
//! # async fn run() -> session_core::error::Result<()> {
//! let manager = StorageManager::new(FileSystemStorage::new("./session_data"));
//! manager.sync_manifests(AssetCategory::Maps, None).await?;
//! for asset in manager.load_assets(AssetCategory::Maps).await? {
//!     if let Asset::Valid(record) = asset {
//!         manager.download_asset(&record, record.asset_name.as_str(), false, None).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod progress;
mod resolver;
mod sync;
mod transfer;
mod validate;

pub use progress::{ProgressCallback, TransferProgress, TransferStage};
pub use sync::SyncReport;
pub use transfer::TransferOutcome;
pub use validate::validate_manifest;

use session_core::prelude::*;
use std::path::{Component, Path, PathBuf};

/// Default root of the local manifest cache.
pub const MANIFESTS_ROOT: &str = "manifests_tmp";

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Holds one cache directory per category tag.
    pub manifests_root: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            manifests_root: PathBuf::from(MANIFESTS_ROOT),
        }
    }
}

/// Entry point for every asset operation.
///
/// Holding a manager means holding a connected backend: credentials are
/// exchanged for the backend before the manager is built.
#[derive(Clone)]
pub struct StorageManager<S: StorageBackend> {
    storage: S,
    config: ManagerConfig,
}

impl<S: StorageBackend> StorageManager<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, ManagerConfig::default())
    }

    pub fn with_config(storage: S, config: ManagerConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Local cache directory of a category.
    pub fn manifest_dir(&self, category: AssetCategory) -> PathBuf {
        self.config.manifests_root.join(category.tag())
    }

    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.storage.list_buckets().await?)
    }
}

/// Relative path of an object key below a local directory, or `None` when
/// the key would escape it.
pub(crate) fn key_to_local_path(key: &str) -> Option<PathBuf> {
    let path = Path::new(key);
    (!key.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_))))
        .then(|| path.to_path_buf())
}
