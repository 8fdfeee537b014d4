use std::sync::Arc;

/// Byte counts reported to upload and download progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes transferred so far.
    pub transferred: u64,

    /// Total expected bytes, if known.
    ///
    /// For downloads this comes from `Content-Length` and is `None` for
    /// chunked responses.
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Calculate the percentage of completion.
    ///
    /// Returns `None` if `total` is unknown.
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.transferred as f64 / total as f64) * 100.0
            }
        })
    }
}

/// Callback invoked with transfer progress.
///
/// Runs on the I/O executor thread; keep it cheap.
pub type ProgressCallback = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Optional upload/download progress sinks of an operation.
#[derive(Clone, Default)]
pub struct ProgressCallbacks {
    pub upload:   Option<ProgressCallback>,
    pub download: Option<ProgressCallback>,
}

impl std::fmt::Debug for ProgressCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCallbacks")
            .field("upload", &self.upload.as_ref().map(|_| "{ ... }"))
            .field("download", &self.download.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}
