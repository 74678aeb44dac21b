use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use session_client::{
    ManagerConfig, ProgressCallback, StorageManager, TransferOutcome, TransferProgress,
    validate_manifest,
};
use session_core::prelude::*;
use session_fs::FileSystemStorage;
use session_opendal::OpendalStorage;
use session_s3::{S3Config, S3Storage};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "session-assets")]
#[command(about = "Browse, sync and publish Session mod assets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Credentials file (JSON service account or access key table)
    #[arg(long, env = "SESSION_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,

    /// Local manifest cache
    #[arg(long, env = "SESSION_MANIFESTS_DIR", default_value = session_client::MANIFESTS_ROOT)]
    manifests_dir: PathBuf,

    /// S3-compatible endpoint for access key credentials
    #[arg(long, env = session_s3::ENDPOINT_ENV)]
    endpoint: Option<String>,

    #[arg(long, env = session_s3::REGION_ENV, default_value = "us-east-1")]
    region: String,

    /// Buckets reachable with a service account (comma separated)
    #[arg(long, env = "SESSION_GCS_BUCKETS", value_delimiter = ',')]
    gcs_buckets: Vec<String>,

    /// Serve buckets from a local directory instead of a remote store
    #[arg(long, env = "SESSION_LOCAL_STORE")]
    local: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every bucket visible with the current credentials
    Buckets,
    /// Refresh the local manifest cache
    Sync {
        /// Only this category; all of them when omitted
        #[arg(short, long)]
        category: Option<AssetCategory>,
    },
    /// Show the cached assets
    List {
        #[arg(short, long)]
        category: Option<AssetCategory>,
    },
    /// Find the bucket holding an object key
    Resolve { key: String },
    /// Download the payloads and thumbnails of a cached category
    Download {
        #[arg(short, long)]
        category: AssetCategory,

        #[arg(short, long)]
        output: PathBuf,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,

        #[arg(long, conflicts_with = "skip_thumbnails")]
        thumbnails_only: bool,

        #[arg(long)]
        skip_thumbnails: bool,
    },
    /// Publish a manifest with its thumbnail and payload
    Upload {
        #[arg(long)]
        manifest: PathBuf,

        #[arg(long)]
        thumbnail: PathBuf,

        #[arg(long)]
        payload: PathBuf,

        #[arg(long)]
        bucket: String,
    },
    /// Remove the objects described by a local manifest
    Delete {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        manifest: PathBuf,
    },
    /// Check a local manifest without touching the store
    Validate { manifest: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Validate { manifest } = &cli.command {
        return validate(manifest).await;
    }

    let config = ManagerConfig {
        manifests_root: cli.manifests_dir.clone(),
    };

    if let Some(root) = &cli.local {
        let storage = FileSystemStorage::new(root);
        return run(StorageManager::with_config(storage, config), cli.command).await;
    }

    let credentials = load_credentials(Some(&cli.credentials))?;
    match &credentials {
        Credentials::AccessKey(_) => {
            let s3 = S3Config {
                force_path_style: cli.endpoint.is_some(),
                endpoint_url: cli.endpoint.clone(),
                region: cli.region.clone(),
            };
            let storage = S3Storage::from_credentials(&credentials, &s3)?;
            run(StorageManager::with_config(storage, config), cli.command).await
        }
        Credentials::ServiceAccount(key) => {
            if cli.gcs_buckets.is_empty() {
                bail!("Service account credentials need --gcs-buckets (or SESSION_GCS_BUCKETS)");
            }
            let storage = OpendalStorage::gcs(key, &cli.gcs_buckets)?;
            run(StorageManager::with_config(storage, config), cli.command).await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

async fn run<S: StorageBackend>(manager: StorageManager<S>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Buckets => {
            for bucket in manager.list_buckets().await? {
                println!("{bucket}");
            }
        }
        Commands::Sync {
            category: Some(category),
        } => {
            let report = manager.sync_manifests(category, None).await?;
            println!("✅ {category}: {} manifests", report.downloaded.len());
        }
        Commands::Sync { category: None } => {
            let mut failed = 0;
            for (category, result) in manager.sync_all(None).await? {
                match result {
                    Ok(report) => println!("✅ {category}: {} manifests", report.downloaded.len()),
                    Err(e) => {
                        failed += 1;
                        println!("❌ {category}: {e}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} categories failed to sync");
            }
        }
        Commands::List { category } => {
            let assets = match category {
                Some(category) => manager.load_assets(category).await?,
                None => manager.load_all_assets().await?,
            };
            for asset in &assets {
                match asset {
                    Asset::Valid(record) => println!(
                        "[{}] {} by {} ({})",
                        record.category, record.name, record.author, record.asset_name
                    ),
                    Asset::Invalid { path, reason } => {
                        println!("[invalid] {}: {reason}", path.display())
                    }
                }
            }
        }
        Commands::Resolve { key } => {
            println!("{}", manager.resolve_bucket(&key).await?);
        }
        Commands::Download {
            category,
            output,
            overwrite,
            thumbnails_only,
            skip_thumbnails,
        } => {
            let progress: &ProgressCallback<'_> = &print_progress;
            for asset in manager.load_assets(category).await? {
                let record = match asset {
                    Asset::Valid(record) => record,
                    Asset::Invalid { path, reason } => {
                        println!("{}", skipped_manifest(&path, &reason));
                        continue;
                    }
                };
                if !skip_thumbnails {
                    let dest = output.join(file_name(&record.thumbnail)?);
                    let outcome = manager
                        .download_thumbnail(&record, &dest, overwrite, Some(progress))
                        .await?;
                    report_download(&dest, outcome);
                }
                if !thumbnails_only {
                    let dest = output.join(file_name(&record.asset_name)?);
                    let outcome = manager
                        .download_asset(&record, &dest, overwrite, Some(progress))
                        .await?;
                    report_download(&dest, outcome);
                }
            }
        }
        Commands::Upload {
            manifest,
            thumbnail,
            payload,
            bucket,
        } => {
            let progress: &ProgressCallback<'_> = &print_progress;
            let record = manager
                .upload_asset(&manifest, &thumbnail, &payload, &bucket, Some(progress))
                .await?;
            println!("✅ Uploaded '{}' to {bucket}", record.name);
        }
        Commands::Delete { bucket, manifest } => {
            manager.delete_asset_by_manifest(&bucket, &manifest).await?;
            println!("🗑️  Deleted {} from {bucket}", manifest.display());
        }
        Commands::Validate { manifest } => validate(&manifest).await?,
    }

    Ok(())
}

async fn validate(manifest: &Path) -> anyhow::Result<()> {
    match validate_manifest(manifest).await {
        Asset::Valid(record) => {
            println!("✅ '{}' is a valid {} manifest", record.name, record.category);
            Ok(())
        }
        Asset::Invalid { path, reason } => bail!("{}: {reason}", path.display()),
    }
}

/// Remote keys may carry prefixes; downloads land flat in the output directory.
fn file_name(key: &str) -> anyhow::Result<&str> {
    Path::new(key)
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("'{key}' has no file name"))
}

fn skipped_manifest(path: &Path, reason: &str) -> String {
    format!("⚠️  Skipping {}: {reason}", path.display())
}

fn print_progress(p: &TransferProgress<'_>) {
    if let Some(fraction) = p.fraction() {
        eprint!("\r{:>3.0}% {}", fraction * 100.0, p.key);
        if fraction >= 1.0 {
            eprintln!();
        }
        let _ = io::stderr().flush();
    }
}

fn report_download(dest: &Path, outcome: TransferOutcome) {
    match outcome {
        TransferOutcome::Skipped => println!("⏭️  {} exists, skipped", dest.display()),
        TransferOutcome::Transferred { bytes } => {
            println!("✅ Saved {} ({bytes} bytes)", dest.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_category_and_bucket_list() {
        let cli = Cli::try_parse_from([
            "session-assets",
            "--gcs-buckets",
            "official,community",
            "sync",
            "--category",
            "griptapes",
        ])
        .unwrap();
        assert_eq!(cli.gcs_buckets, vec!["official", "community"]);
        assert!(matches!(
            cli.command,
            Commands::Sync {
                category: Some(AssetCategory::Griptapes)
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_category() {
        assert!(Cli::try_parse_from(["session-assets", "list", "--category", "caps"]).is_err());
    }

    #[test]
    fn test_thumbnail_flags_conflict() {
        let result = Cli::try_parse_from([
            "session-assets",
            "download",
            "--category",
            "maps",
            "--output",
            "out",
            "--thumbnails-only",
            "--skip-thumbnails",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_download_file_names_drop_prefixes() {
        assert_eq!(file_name("community/park.zip").unwrap(), "park.zip");
        assert_eq!(file_name("park.png").unwrap(), "park.png");
        assert!(file_name("..").is_err());
    }

    #[test]
    fn test_skipped_manifest_names_file_and_reason() {
        let line = skipped_manifest(Path::new("manifests_tmp/maps/broken.json"), "missing field `AssetName`");
        assert!(line.starts_with("⚠️"));
        assert!(line.contains("broken.json"));
        assert!(line.contains("missing field `AssetName`"));
    }
}
