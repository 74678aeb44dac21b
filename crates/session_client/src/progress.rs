/// Which object of an asset a transfer moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Manifest,
    Thumbnail,
    Payload,
}

/// Snapshot handed to a progress callback after each chunk.
#[derive(Debug, Clone, Copy)]
pub struct TransferProgress<'a> {
    pub key: &'a str,
    pub stage: TransferStage,
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
}

impl TransferProgress<'_> {
    /// Completion ratio in `0.0..=1.0`, when the total size is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_transferred as f64 / total as f64).min(1.0))
    }
}

/// Observer invoked synchronously with every chunk of a transfer. It may
/// borrow caller state for `'c`.
pub type ProgressCallback<'c> = dyn for<'a> Fn(&TransferProgress<'a>) + Send + Sync + 'c;

pub(crate) fn report(
    progress: Option<&ProgressCallback<'_>>,
    key: &str,
    stage: TransferStage,
    bytes_transferred: u64,
    total_bytes: Option<u64>,
) {
    if let Some(callback) = progress {
        callback(&TransferProgress {
            key,
            stage,
            bytes_transferred,
            total_bytes,
        });
    }
}
