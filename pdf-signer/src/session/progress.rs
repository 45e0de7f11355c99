//! Batch progress broadcast.

use tokio::sync::watch;

use super::SigningSession;

/// Rasterization progress of the most recent batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch: u64,
    pub completed: usize,
    pub total: usize,
    pub loading: bool,
}

impl SigningSession {
    /// Watch progress of whichever batch is current
    pub fn subscribe_progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    pub(super) fn begin_progress(&self, batch: u64, total: usize) {
        self.progress.send_replace(BatchProgress {
            batch,
            completed: 0,
            total,
            loading: total > 0,
        });
    }

    /// Count one finished document. Updates for superseded batches are dropped.
    pub(super) fn record_document_done(&self, batch: u64) {
        self.progress.send_if_modified(|progress| {
            if progress.batch != batch {
                return false;
            }
            progress.completed += 1;
            true
        });
    }

    pub(super) fn finish_progress(&self, batch: u64) {
        self.progress.send_if_modified(|progress| {
            if progress.batch != batch {
                return false;
            }
            progress.loading = false;
            true
        });
    }
}
