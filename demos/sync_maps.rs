//! # Sync Maps Example
//!
//! Syncs the map manifests, then downloads every map thumbnail and payload
//! into `./test`.
//!
//! Access key credentials talk to S3 (honouring `SESSION_S3_ENDPOINT`), a
//! service account talks to the GCS buckets listed in `SESSION_GCS_BUCKETS`.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --example sync_maps --features "client s3 opendal"
//! ```

use session_store::prelude::*;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let credentials = load_credentials(None)?;
    match &credentials {
        Credentials::AccessKey(_) => {
            let storage = S3Storage::from_credentials(&credentials, &S3Config::from_env())?;
            sync_maps(StorageManager::new(storage)).await
        }
        Credentials::ServiceAccount(key) => {
            let buckets: Vec<String> = std::env::var("SESSION_GCS_BUCKETS")?
                .split(',')
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect();
            let storage = OpendalStorage::gcs(key, &buckets)?;
            sync_maps(StorageManager::new(storage)).await
        }
    }
}

async fn sync_maps<S: StorageBackend>(manager: StorageManager<S>) -> anyhow::Result<()> {
    println!("Getting manifests");
    let report = manager.sync_manifests(AssetCategory::Maps, None).await?;
    println!("Fetched {} manifests", report.downloaded.len());

    let out = Path::new("test");
    for asset in manager.load_assets(AssetCategory::Maps).await? {
        let record = match asset {
            Asset::Valid(record) => record,
            Asset::Invalid { path, reason } => {
                println!("Skipping {}: {reason}", path.display());
                continue;
            }
        };
        println!("{} by {}", record.name, record.author);

        println!("downloading thumbnail...");
        manager
            .download_thumbnail(&record, out.join(&record.thumbnail), false, None)
            .await?;

        println!("downloading asset...");
        manager
            .download_asset(&record, out.join(&record.asset_name), false, None)
            .await?;
    }

    println!("done!");
    Ok(())
}
