use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`StorageBackend`](crate::traits::StorageBackend).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Unauthorized(String),

    #[error("Storage backend error: {0}")]
    Generic(String),
}

/// One object that could not be removed while deleting an asset.
#[derive(Debug)]
pub struct DeleteFailure {
    pub key: String,
    pub error: StorageError,
}

impl fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.key, self.error)
    }
}

#[derive(Error, Debug)]
pub enum AssetStoreError {
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Credentials file not found: {}", .0.display())]
    CredentialsNotFound(PathBuf),

    #[error("Malformed credentials: {0}")]
    CredentialsMalformed(String),

    #[error("Unknown asset category: '{0}'")]
    UnknownCategory(String),

    #[error("Invalid asset manifest: {0}")]
    InvalidManifest(String),

    #[error("Remote object not found in any bucket: {0}")]
    RemoteObjectNotFound(String),

    #[error("Transfer of '{key}' failed: {source}")]
    TransferFailed {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Asset deletion incomplete: {}", join_failures(.0))]
    DeleteIncomplete(Vec<DeleteFailure>),

    #[error(transparent)]
    Storage(StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_failures(failures: &[DeleteFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AssetStoreError {
    /// Wraps a backend error raised while moving the bytes of `key`.
    ///
    /// Authorization failures are not transfer failures and surface as
    /// [`AssetStoreError::NotAuthenticated`].
    pub fn transfer(key: impl Into<String>, source: StorageError) -> Self {
        match source {
            StorageError::Unauthorized(reason) => Self::NotAuthenticated(reason),
            source => Self::TransferFailed {
                key: key.into(),
                source,
            },
        }
    }
}

impl From<StorageError> for AssetStoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unauthorized(reason) => Self::NotAuthenticated(reason),
            err => Self::Storage(err),
        }
    }
}

pub type Result<T, E = AssetStoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_backend_errors_become_not_authenticated() {
        let err = AssetStoreError::from(StorageError::Unauthorized("bad key".into()));
        assert!(matches!(err, AssetStoreError::NotAuthenticated(_)));

        let err = AssetStoreError::transfer("a.zip", StorageError::Unauthorized("expired".into()));
        assert!(matches!(err, AssetStoreError::NotAuthenticated(_)));
    }

    #[test]
    fn delete_incomplete_lists_every_key() {
        let err = AssetStoreError::DeleteIncomplete(vec![
            DeleteFailure {
                key: "thumb.png".into(),
                error: StorageError::NotFound("thumb.png".into()),
            },
            DeleteFailure {
                key: "map.zip".into(),
                error: StorageError::Generic("boom".into()),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("'thumb.png'"));
        assert!(msg.contains("'map.zip'"));
    }
}
