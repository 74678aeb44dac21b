use session_core::prelude::*;
use std::path::Path;

/// Parses a local manifest without failing: any read or schema error comes
/// back as [`Asset::Invalid`] carrying the reason.
pub async fn validate_manifest(path: &Path) -> Asset {
    match tokio::fs::read(path).await {
        Ok(data) => Asset::from_file_contents(path, &data),
        Err(e) => Asset::Invalid {
            path: path.to_path_buf(),
            reason: format!("cannot read {}: {e}", path.display()),
        },
    }
}
