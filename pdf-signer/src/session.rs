//! Signing session: the current upload batch, its pages and their overlays.
//!
//! This module coordinates the pipeline:
//! - Upload batches and stale-completion guarding
//! - Per-page overlay state and the shared signature
//! - Snapshot capture and PDF export
//! - Progress reporting

mod export;
mod overlays;
mod progress;
mod state;
mod upload;

pub use progress::BatchProgress;
pub use state::{BatchState, DocumentEntry, DocumentOutcome};
pub use upload::UploadOutcome;

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::compositor::Compositor;
use crate::config::SignerConfig;
use crate::document::PageKey;
use crate::error::{SignerError, SignerResult};
use crate::overlay::OverlayController;
use crate::raster::{Rasterizer, RenderBackend};
use crate::signature::SignatureAsset;

/// Bookkeeping for starting a new batch
struct BatchControl {
    last_id: u64,
    token: CancellationToken,
}

/// One user session of the signing pipeline
pub struct SigningSession {
    config: Arc<SignerConfig>,
    rasterizer: Rasterizer,
    compositor: Compositor,
    /// Shared read-only by every overlay
    signature: ArcSwapOption<SignatureAsset>,
    /// Replaced wholesale; never mutated in place
    batch: ArcSwap<BatchState>,
    control: Mutex<BatchControl>,
    overlays: DashMap<PageKey, OverlayController>,
    progress: watch::Sender<BatchProgress>,
}

impl SigningSession {
    pub fn new(config: SignerConfig, backend: Arc<dyn RenderBackend>) -> Self {
        info!(
            raster_scale = config.render.scale(),
            capture_scale = config.capture.scale,
            page_format = ?config.output.page_format,
            "Initializing signing session"
        );

        let rasterizer = Rasterizer::new(
            backend,
            config.render.scale(),
            config.layout.container_width,
        );
        let compositor = Compositor::new(&config.capture);
        let (progress, _) = watch::channel(BatchProgress::default());

        Self {
            config: Arc::new(config),
            rasterizer,
            compositor,
            signature: ArcSwapOption::empty(),
            batch: ArcSwap::from_pointee(BatchState::empty()),
            control: Mutex::new(BatchControl {
                last_id: 0,
                token: CancellationToken::new(),
            }),
            overlays: DashMap::new(),
            progress,
        }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// The batch currently on display
    pub fn current_batch(&self) -> Arc<BatchState> {
        self.batch.load_full()
    }

    /// True while the current batch is still rasterizing
    pub fn is_loading(&self) -> bool {
        self.batch.load().loading
    }

    /// Run `f` only while `batch` is still the current batch.
    ///
    /// Holds the batch control lock, so no new batch can start and the
    /// signature cannot change until `f` returns.
    fn while_current<R>(&self, batch: u64, f: impl FnOnce() -> R) -> SignerResult<R> {
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.batch.load().id;
        if current != batch {
            return Err(SignerError::BatchSuperseded { batch, current });
        }
        Ok(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::error::SignerError;
    use crate::overlay::Gesture;
    use crate::raster::testing::{FakeBackend, fake_pdf};
    use bytes::Bytes;
    use image::{Rgba, RgbaImage};
    use lopdf::Document as PdfDocument;
    use std::time::Duration;

    fn session() -> Arc<SigningSession> {
        Arc::new(SigningSession::new(
            SignerConfig::default(),
            Arc::new(FakeBackend),
        ))
    }

    fn signature() -> SignatureAsset {
        SignatureAsset::from_image(RgbaImage::from_pixel(40, 10, Rgba([0, 0, 0, 255]))).unwrap()
    }

    fn page_count(bytes: &[u8]) -> usize {
        PdfDocument::load_mem(bytes).unwrap().get_pages().len()
    }

    /// Decode the JPEG placed on page 1 of an exported PDF
    fn first_page_image(bytes: &[u8]) -> image::RgbImage {
        let doc = PdfDocument::load_mem(bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
        let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
        image::load_from_memory(&stream.content).unwrap().to_rgb8()
    }

    fn is_dark(pixel: &image::Rgb<u8>) -> bool {
        pixel.0.iter().all(|&c| c < 60)
    }

    #[tokio::test]
    async fn test_single_page_without_signature() {
        let session = session();
        let outcome = session
            .upload(vec![Document::new("doc.pdf", fake_pdf(1))])
            .await;
        assert_eq!(outcome, UploadOutcome::Committed { batch: 1 });
        assert!(!session.is_loading());

        let output = session.export_document(0).await.unwrap();
        assert_eq!(output.file_name, "doc_signed.pdf");
        assert_eq!(output.page_count, 1);
        assert_eq!(page_count(&output.bytes), 1);
    }

    #[tokio::test]
    async fn test_documents_export_independently() {
        let session = session();
        session
            .upload(vec![
                Document::new("first.pdf", fake_pdf(2)),
                Document::new("second.pdf", fake_pdf(3)),
            ])
            .await;

        let batch = session.current_batch();
        assert_eq!(batch.documents.len(), 2);
        assert_eq!(batch.documents[0].page_count(), Some(2));
        assert_eq!(batch.documents[1].page_count(), Some(3));

        let first = session.export_document(0).await.unwrap();
        let second = session.export_document(1).await.unwrap();
        assert_eq!(page_count(&first.bytes), 2);
        assert_eq!(page_count(&second.bytes), 3);
        assert_eq!(first.file_name, "first_signed.pdf");
        assert_eq!(second.file_name, "second_signed.pdf");
    }

    #[tokio::test]
    async fn test_overlay_moves_on_one_page_only() {
        let session = session();
        session.set_signature(Some(signature()));
        session
            .upload(vec![Document::new(
                "contract.pdf",
                b"%FAKE pages=2 size=300x400".to_vec(),
            )])
            .await;

        let moved = session
            .apply_gesture(0, 1, Gesture::Drag { x: 50.0, y: 100.0 })
            .unwrap()
            .unwrap();
        assert_eq!((moved.rect.x, moved.rect.y), (50.0, 100.0));
        let untouched = session.overlay(0, 2).unwrap().unwrap();
        assert_eq!((untouched.rect.x, untouched.rect.y), (0.0, 0.0));

        let page_one = session.export_page(0, 1).await.unwrap();
        let page_two = session.export_page(0, 2).await.unwrap();
        assert_eq!(page_one.file_name, "contract Page 1_signed.pdf");
        assert_eq!(page_one.page_count, 1);

        // Overlays are 240x60 at capture scale 2
        let one = first_page_image(&page_one.bytes);
        let two = first_page_image(&page_two.bytes);
        assert!(is_dark(one.get_pixel(300, 260)));
        assert!(!is_dark(one.get_pixel(200, 60)));
        assert!(is_dark(two.get_pixel(200, 60)));
        assert!(!is_dark(two.get_pixel(300, 260)));
    }

    #[tokio::test]
    async fn test_stale_batch_is_discarded() {
        let session = session();
        let slow = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .upload(vec![Document::new(
                        "old.pdf",
                        b"%FAKE pages=1 delay_ms=300".to_vec(),
                    )])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.is_loading());

        let fresh = session
            .upload(vec![Document::new("new.pdf", fake_pdf(2))])
            .await;
        let stale = slow.await.unwrap();

        assert_eq!(stale, UploadOutcome::Superseded { batch: 1 });
        assert_eq!(fresh, UploadOutcome::Committed { batch: 2 });

        let batch = session.current_batch();
        assert_eq!(batch.id, 2);
        assert_eq!(batch.documents.len(), 1);
        assert_eq!(batch.documents[0].document.display_name, "new");
        assert!(!batch.loading);
    }

    #[tokio::test]
    async fn test_export_waits_for_rasterization() {
        let session = session();
        let upload = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .upload(vec![Document::new(
                        "doc.pdf",
                        b"%FAKE pages=1 delay_ms=100".to_vec(),
                    )])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = session.export_document(0).await.unwrap_err();
        assert!(matches!(err, SignerError::BatchNotReady { batch: 1 }));

        upload.await.unwrap();
        assert!(session.export_document(0).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_document_is_isolated() {
        let session = session();
        session
            .upload(vec![
                Document::new("good.pdf", fake_pdf(2)),
                Document::new("broken.pdf", b"garbage".to_vec()),
                Document::new("torn.pdf", b"%FAKE pages=3 fail_page=2".to_vec()),
            ])
            .await;

        let batch = session.current_batch();
        assert_eq!(batch.documents[0].page_count(), Some(2));
        assert!(matches!(
            batch.documents[1].outcome,
            DocumentOutcome::Failed { code: "decode_error", .. }
        ));
        assert!(matches!(
            batch.documents[2].outcome,
            DocumentOutcome::Failed {
                code: "render_surface_error",
                ..
            }
        ));

        let err = session.export_document(1).await.unwrap_err();
        assert_eq!(err.error_code(), "document_failed");

        let all = session.export_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].as_ref().unwrap().page_count, 2);
        assert!(all[1].is_err());
        assert!(all[2].is_err());
    }

    #[tokio::test]
    async fn test_progress_reports_completion() {
        let session = session();
        let progress = session.subscribe_progress();
        session
            .upload(vec![
                Document::new("a.pdf", fake_pdf(1)),
                Document::new("b.pdf", fake_pdf(1)),
            ])
            .await;

        assert_eq!(
            *progress.borrow(),
            BatchProgress {
                batch: 1,
                completed: 2,
                total: 2,
                loading: false,
            }
        );
    }

    #[tokio::test]
    async fn test_unreadable_signature_disables_overlays() {
        let session = session();
        session
            .upload(vec![Document::new("doc.pdf", fake_pdf(1))])
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"not an image").unwrap();
        assert!(!session.load_custom_signature(file.path()));
        assert!(session.signature().is_none());
        assert!(session.overlay(0, 1).unwrap().is_none());

        // Export still works, just without a signature
        assert!(session.export_document(0).await.is_ok());
    }

    #[tokio::test]
    async fn test_new_signature_keeps_overlay_position() {
        let session = session();
        session.set_signature(Some(signature()));
        session
            .upload(vec![Document::new("doc.pdf", b"%FAKE size=300x400".to_vec())])
            .await;
        session
            .apply_gesture(0, 1, Gesture::Drag { x: 20.0, y: 30.0 })
            .unwrap();

        let square = SignatureAsset::from_image(RgbaImage::new(10, 10)).unwrap();
        session.set_signature(Some(square));

        let overlay = session.overlay(0, 1).unwrap().unwrap();
        assert_eq!((overlay.rect.x, overlay.rect.y), (20.0, 30.0));
        assert_eq!(overlay.aspect_ratio, 1.0);
        assert!((overlay.rect.width - 240.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_pages() {
        let session = session();
        session
            .upload(vec![Document::new("doc.pdf", fake_pdf(1))])
            .await;

        let err = session
            .apply_gesture(0, 9, Gesture::Drag { x: 0.0, y: 0.0 })
            .unwrap_err();
        assert_eq!(err.error_code(), "page_not_found");

        let err = session.export_document(4).await.unwrap_err();
        assert_eq!(err.error_code(), "document_not_found");
    }

    #[tokio::test]
    async fn test_new_batch_resets_overlays() {
        let session = session();
        session.set_signature(Some(signature()));
        session
            .upload(vec![Document::new("doc.pdf", b"%FAKE size=300x400".to_vec())])
            .await;
        session
            .apply_gesture(0, 1, Gesture::Drag { x: 20.0, y: 30.0 })
            .unwrap();

        session
            .upload(vec![Document::new("doc.pdf", b"%FAKE size=300x400".to_vec())])
            .await;
        let overlay = session.overlay(0, 1).unwrap().unwrap();
        assert_eq!((overlay.rect.x, overlay.rect.y), (0.0, 0.0));
    }

    #[tokio::test]
    async fn test_export_all_stays_within_its_batch() {
        let session = session();
        session.set_signature(Some(signature()));
        session
            .upload(vec![
                Document::new("old-a.pdf", b"%FAKE pages=3 size=1500x1500".to_vec()),
                Document::new("old-b.pdf", fake_pdf(1)),
            ])
            .await;
        let old_ids: Vec<_> = session
            .current_batch()
            .documents
            .iter()
            .map(|entry| entry.document.id)
            .collect();

        let export = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.export_all().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        session
            .upload(vec![
                Document::new("new-a.pdf", fake_pdf(1)),
                Document::new("new-b.pdf", fake_pdf(1)),
            ])
            .await;

        let outputs = export.await.unwrap().unwrap();
        assert_eq!(outputs.len(), 2);
        for output in &outputs {
            match output {
                Ok(pdf) => assert!(pdf.file_name.starts_with("old-"), "{}", pdf.file_name),
                Err(e) => assert_eq!(e.error_code(), "batch_superseded"),
            }
        }
        assert!(
            session
                .overlays
                .iter()
                .all(|controller| !old_ids.contains(&controller.key().document))
        );
    }

    #[tokio::test]
    async fn test_replaced_batch_is_not_exported() {
        let session = session();
        session.set_signature(Some(signature()));
        session
            .upload(vec![Document::new("old.pdf", fake_pdf(2))])
            .await;
        let old = session.current_batch();

        session
            .upload(vec![Document::new("new.pdf", fake_pdf(1))])
            .await;

        let err = session.export_entry(&old, 0).await.unwrap_err();
        assert!(matches!(
            err,
            SignerError::BatchSuperseded {
                batch: 1,
                current: 2
            }
        ));
        // No overlay was placed for the old pages
        assert!(session.overlays.is_empty());

        let fresh = session.export_document(0).await.unwrap();
        assert_eq!(fresh.file_name, "new_signed.pdf");
    }

    #[tokio::test]
    async fn test_signature_swap_reshapes_stored_overlays() {
        let session = session();
        session.set_signature(Some(signature()));
        session
            .upload(vec![Document::new("doc.pdf", b"%FAKE pages=3 size=300x400".to_vec())])
            .await;
        for page in 1..=3 {
            session.overlay(0, page).unwrap();
        }

        let square = SignatureAsset::from_image(RgbaImage::new(10, 10)).unwrap();
        session.set_signature(Some(square));

        // Checked on the stored controllers, without re-deriving on access
        let aspect_ratio = session.signature().unwrap().aspect_ratio();
        assert_eq!(session.overlays.len(), 3);
        for controller in session.overlays.iter() {
            let overlay = controller.overlay().unwrap();
            assert_eq!(overlay.aspect_ratio, aspect_ratio);
            assert!((overlay.rect.width - overlay.rect.height).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_unreadable_input_fails_in_place() {
        let session = session();
        session.set_signature(Some(signature()));
        session
            .upload(vec![
                Document::new("missing.pdf", Bytes::new()),
                Document::new("present.pdf", fake_pdf(2)),
            ])
            .await;

        let batch = session.current_batch();
        assert!(matches!(
            batch.documents[0].outcome,
            DocumentOutcome::Failed { code: "decode_error", .. }
        ));

        let moved = session
            .apply_gesture(1, 2, Gesture::Drag { x: 5.0, y: 5.0 })
            .unwrap()
            .unwrap();
        assert_eq!((moved.rect.x, moved.rect.y), (5.0, 5.0));

        let all = session.export_all().await.unwrap();
        assert_eq!(all[0].as_ref().unwrap_err().error_code(), "document_failed");
        assert_eq!(all[1].as_ref().unwrap().file_name, "present_signed.pdf");
    }
}
