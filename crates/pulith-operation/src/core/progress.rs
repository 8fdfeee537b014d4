use crate::data::TransferProgress;

/// Running byte count that only reports forward progress.
///
/// Reported counts are non-decreasing and never exceed a known total.
#[derive(Debug, Clone)]
pub struct ProgressGate {
    transferred: u64,
    reported: Option<u64>,
    total: Option<u64>,
}

impl ProgressGate {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            transferred: 0,
            reported: None,
            total,
        }
    }

    /// Record `bytes` more and return the progress to report, if it moved.
    pub fn advance(&mut self, bytes: u64) -> Option<TransferProgress> {
        self.transferred = self.transferred.saturating_add(bytes);
        let visible = match self.total {
            Some(total) => self.transferred.min(total),
            None => self.transferred,
        };
        if self.reported.is_some_and(|last| visible <= last) {
            return None;
        }
        self.reported = Some(visible);
        Some(TransferProgress {
            transferred: visible,
            total: self.total,
        })
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}
