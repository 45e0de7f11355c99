//! Snapshot capture and PDF export.
//!
//! Every export is all-or-nothing: one failed capture aborts it and no bytes
//! are returned.

use bytes::Bytes;
use tracing::{error, info};

use super::SigningSession;
use super::state::BatchState;
use crate::assembler::{OutputPdf, assemble, document_file_name, page_file_name};
use crate::compositor::SignatureLayer;
use crate::document::Page;
use crate::error::{CaptureError, SignerError, SignerResult, format_error_chain};

impl SigningSession {
    /// Export every page of document `index` as `<name>_signed.pdf`.
    pub async fn export_document(&self, index: usize) -> SignerResult<OutputPdf> {
        let batch = self.batch.load_full();
        if batch.loading {
            return Err(SignerError::BatchNotReady { batch: batch.id });
        }
        self.export_entry(&batch, index).await
    }

    /// Export a single page as its own one-page PDF.
    pub async fn export_page(&self, index: usize, number: usize) -> SignerResult<OutputPdf> {
        let batch = self.batch.load_full();
        if batch.loading {
            return Err(SignerError::BatchNotReady { batch: batch.id });
        }
        let entry = batch.document(index)?;
        let page = batch.page(index, number)?.clone();
        let file_name = page_file_name(
            &entry.document.display_name,
            number,
            &self.config.output.suffix,
        );
        self.render_output(&batch, vec![page], file_name).await
    }

    /// Export each document of the batch, in upload order.
    ///
    /// Documents fail independently; the outer error only reports a batch
    /// that is still rasterizing. If a new upload starts part way through,
    /// the remaining documents fail with `BatchSuperseded`.
    pub async fn export_all(&self) -> SignerResult<Vec<SignerResult<OutputPdf>>> {
        let batch = self.batch.load_full();
        if batch.loading {
            return Err(SignerError::BatchNotReady { batch: batch.id });
        }

        let mut outputs = Vec::with_capacity(batch.documents.len());
        for (index, entry) in batch.documents.iter().enumerate() {
            let result = self.export_entry(&batch, index).await;
            if let Err(e) = &result {
                error!(
                    batch = batch.id,
                    document = %entry.document.display_name,
                    error_code = e.error_code(),
                    error = %format_error_chain(e),
                    "Export failed"
                );
            }
            outputs.push(result);
        }
        Ok(outputs)
    }

    /// Export document `index` of `batch`, which may no longer be current.
    pub(super) async fn export_entry(
        &self,
        batch: &BatchState,
        index: usize,
    ) -> SignerResult<OutputPdf> {
        let entry = batch.document(index)?;
        let pages = batch.ready_pages(index)?.to_vec();
        let file_name = document_file_name(&entry.document.display_name, &self.config.output.suffix);
        self.render_output(batch, pages, file_name).await
    }

    async fn render_output(
        &self,
        batch: &BatchState,
        pages: Vec<Page>,
        file_name: String,
    ) -> SignerResult<OutputPdf> {
        // Overlays belong to the current batch only
        let (signature, overlays) = self.while_current(batch.id, || {
            let signature = self.signature.load_full();
            let overlays: Vec<_> = pages.iter().map(|page| self.overlay_for(page)).collect();
            (signature, overlays)
        })?;
        let compositor = self.compositor.clone();
        let format = self.config.output.page_format;
        let page_count = pages.len();

        let bytes = tokio::task::spawn_blocking(move || -> SignerResult<Vec<u8>> {
            let mut snapshots = Vec::with_capacity(pages.len());
            for (page, overlay) in pages.iter().zip(overlays) {
                let layer = match (overlay, signature.as_deref()) {
                    (Some(overlay), Some(signature)) => Some(SignatureLayer { overlay, signature }),
                    _ => None,
                };
                snapshots.push(compositor.capture(page, layer)?);
            }
            Ok(assemble(&snapshots, format)?)
        })
        .await
        .map_err(|e| CaptureError::Task {
            message: e.to_string(),
        })??;

        info!(
            batch = batch.id,
            file = %file_name,
            pages = page_count,
            bytes = bytes.len(),
            "Exported signed PDF"
        );

        Ok(OutputPdf {
            file_name,
            bytes: Bytes::from(bytes),
            page_count,
        })
    }
}
