//! Immutable snapshots of an upload batch.

use std::sync::Arc;

use crate::document::{Document, Page};
use crate::error::{SignerError, SignerResult};

/// Rasterization result for one document
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Pending,
    Ready(Arc<Vec<Page>>),
    Failed { code: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub document: Document,
    pub outcome: DocumentOutcome,
}

impl DocumentEntry {
    pub fn pages(&self) -> Option<&[Page]> {
        match &self.outcome {
            DocumentOutcome::Ready(pages) => Some(pages.as_slice()),
            _ => None,
        }
    }

    pub fn page_count(&self) -> Option<usize> {
        self.pages().map(<[Page]>::len)
    }
}

/// Everything the session shows for one upload batch
#[derive(Debug, Clone)]
pub struct BatchState {
    pub id: u64,
    pub loading: bool,
    /// In upload order, regardless of completion order
    pub documents: Vec<DocumentEntry>,
}

impl BatchState {
    pub fn empty() -> Self {
        Self {
            id: 0,
            loading: false,
            documents: Vec::new(),
        }
    }

    pub(super) fn loading(id: u64, documents: &[Document]) -> Self {
        Self {
            id,
            loading: true,
            documents: documents
                .iter()
                .map(|document| DocumentEntry {
                    document: document.clone(),
                    outcome: DocumentOutcome::Pending,
                })
                .collect(),
        }
    }

    pub fn document(&self, index: usize) -> SignerResult<&DocumentEntry> {
        self.documents
            .get(index)
            .ok_or(SignerError::DocumentNotFound { index })
    }

    /// Pages of a fully rasterized document
    pub fn ready_pages(&self, index: usize) -> SignerResult<&[Page]> {
        let entry = self.document(index)?;
        match &entry.outcome {
            DocumentOutcome::Ready(pages) => Ok(pages.as_slice()),
            DocumentOutcome::Pending => Err(SignerError::BatchNotReady { batch: self.id }),
            DocumentOutcome::Failed { message, .. } => Err(SignerError::DocumentFailed {
                document: entry.document.display_name.clone(),
                message: message.clone(),
            }),
        }
    }

    /// Page `number` (1-based) of document `index`
    pub fn page(&self, index: usize, number: usize) -> SignerResult<&Page> {
        let entry = self.document(index)?;
        let pages = self.ready_pages(index)?;
        number
            .checked_sub(1)
            .and_then(|i| pages.get(i))
            .ok_or_else(|| SignerError::PageNotFound {
                document: entry.document.display_name.clone(),
                page: number,
            })
    }
}
