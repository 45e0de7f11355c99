//! Upload batches: fan documents out to the rasterizer, commit once.

use std::sync::{Arc, PoisonError};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::SigningSession;
use super::state::{BatchState, DocumentEntry, DocumentOutcome};
use crate::document::Document;
use crate::error::{SignerError, format_error_chain};

/// How an upload batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The batch's results are now the session's state
    Committed { batch: u64 },
    /// A newer batch started first; these results were dropped
    Superseded { batch: u64 },
}

impl SigningSession {
    /// Rasterize `documents` as one batch, replacing the previous batch.
    ///
    /// Documents rasterize concurrently and fail independently. Results are
    /// committed in a single swap, and only if no newer upload has started.
    pub async fn upload(&self, documents: Vec<Document>) -> UploadOutcome {
        let (batch, token) = self.begin_batch(&documents);
        let total = documents.len();
        info!(batch = batch, documents = total, "Started upload batch");

        let tasks = documents.iter().map(|document| {
            let token = &token;
            async move {
                let result = tokio::select! {
                    _ = token.cancelled() => return None,
                    result = self.rasterizer.rasterize(document) => result,
                };
                self.record_document_done(batch);

                Some(match result {
                    Ok(pages) => DocumentOutcome::Ready(Arc::new(pages)),
                    Err(e) => {
                        let e = SignerError::from(e);
                        let message = format_error_chain(&e);
                        error!(
                            batch = batch,
                            document = %document.display_name,
                            error = %message,
                            "Document failed to rasterize"
                        );
                        DocumentOutcome::Failed {
                            code: e.error_code(),
                            message,
                        }
                    }
                })
            }
        });
        let outcomes = join_all(tasks).await;

        if token.is_cancelled() {
            info!(batch = batch, "Discarding superseded batch");
            return UploadOutcome::Superseded { batch };
        }

        let committed = BatchState {
            id: batch,
            loading: false,
            documents: documents
                .into_iter()
                .zip(outcomes)
                .map(|(document, outcome)| DocumentEntry {
                    document,
                    outcome: outcome.unwrap_or(DocumentOutcome::Pending),
                })
                .collect(),
        };

        let previous = self.batch.rcu(|current| {
            if current.id == batch {
                Arc::new(committed.clone())
            } else {
                Arc::clone(current)
            }
        });
        if previous.id != batch {
            info!(batch = batch, current = previous.id, "Discarding superseded batch");
            return UploadOutcome::Superseded { batch };
        }

        self.finish_progress(batch);
        info!(
            batch = batch,
            ready = committed
                .documents
                .iter()
                .filter(|entry| entry.pages().is_some())
                .count(),
            documents = total,
            "Committed upload batch"
        );
        UploadOutcome::Committed { batch }
    }

    /// Allocate a batch id, cancel the previous batch and show the new one
    /// as loading.
    fn begin_batch(&self, documents: &[Document]) -> (u64, CancellationToken) {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        control.last_id += 1;
        let batch = control.last_id;

        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut control.token, token.clone());
        previous.cancel();

        self.overlays.clear();
        self.batch
            .store(Arc::new(BatchState::loading(batch, documents)));
        self.begin_progress(batch, documents.len());

        (batch, token)
    }
}
