pub use session_core::*;

#[cfg(feature = "client")]
pub mod client {
    pub use session_client::*;
}

#[cfg(feature = "fs")]
pub mod fs {
    pub use session_fs::*;
}

#[cfg(feature = "s3")]
pub mod s3 {
    pub use session_s3::*;
}

#[cfg(feature = "opendal")]
pub mod opendal {
    pub use session_opendal::*;
}

pub mod prelude {
    pub use session_core::prelude::*;

    #[cfg(feature = "client")]
    pub use session_client::{
        ManagerConfig, ProgressCallback, StorageManager, SyncReport, TransferOutcome,
        TransferProgress, TransferStage, validate_manifest,
    };

    #[cfg(feature = "fs")]
    pub use session_fs::FileSystemStorage;

    #[cfg(feature = "s3")]
    pub use session_s3::{S3Config, S3Storage};

    #[cfg(feature = "opendal")]
    pub use session_opendal::OpendalStorage;
}
