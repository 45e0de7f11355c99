//! Signature and per-page overlay operations.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use tracing::{debug, info, warn};

use super::SigningSession;
use crate::document::{Page, PageKey};
use crate::error::SignerResult;
use crate::overlay::{Gesture, Overlay, OverlayController};
use crate::signature::SignatureAsset;

impl SigningSession {
    pub fn signature(&self) -> Option<Arc<SignatureAsset>> {
        self.signature.load_full()
    }

    /// Replace the shared signature.
    ///
    /// Existing overlays are resized for the new aspect ratio and keep their
    /// position. Clearing the signature drops every overlay. Exports see
    /// either the old signature with the old overlays or the new pair.
    pub fn set_signature(&self, signature: Option<SignatureAsset>) {
        let aspect_ratio = signature.as_ref().map(SignatureAsset::aspect_ratio);
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);

        match aspect_ratio {
            Some(aspect_ratio) => {
                for mut controller in self.overlays.iter_mut() {
                    controller.replace_signature(aspect_ratio);
                }
                info!(
                    aspect_ratio = aspect_ratio,
                    overlays = self.overlays.len(),
                    "Signature replaced"
                );
            }
            None => {
                self.overlays.clear();
                info!("Signature cleared");
            }
        }
        self.signature.store(signature.map(Arc::new));
    }

    /// Load an uploaded signature image.
    ///
    /// On failure the session carries on without a signature, so pages
    /// export without overlays. Returns whether the image was loaded.
    pub fn load_custom_signature(&self, path: &Path) -> bool {
        match SignatureAsset::load(path) {
            Ok(signature) => {
                info!(
                    path = %path.display(),
                    width = signature.natural_width(),
                    height = signature.natural_height(),
                    "Loaded custom signature"
                );
                self.set_signature(Some(signature));
                true
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %crate::error::format_error_chain(&e),
                    "Custom signature could not be loaded, continuing without overlays"
                );
                self.set_signature(None);
                false
            }
        }
    }

    /// Current overlay of a page, placing it on first access.
    ///
    /// `Ok(None)` means there is no signature, or the page has no measurable
    /// area.
    pub fn overlay(&self, document: usize, page: usize) -> SignerResult<Option<Overlay>> {
        let batch = self.batch.load_full();
        let page = batch.page(document, page)?;
        self.while_current(batch.id, || self.overlay_for(page))
    }

    /// Drag or resize the overlay on one page. Other pages are unaffected.
    pub fn apply_gesture(
        &self,
        document: usize,
        page: usize,
        gesture: Gesture,
    ) -> SignerResult<Option<Overlay>> {
        let batch = self.batch.load_full();
        let page = batch.page(document, page)?;

        let overlay = self.while_current(batch.id, || {
            let aspect_ratio = self.signature.load_full()?.aspect_ratio();
            self.with_controller(page, |controller| {
                controller.ensure_initialized(aspect_ratio);
                controller.apply(gesture)
            })
        })?;
        match &overlay {
            Some(overlay) => debug!(
                document = %page.document,
                page = page.number,
                x = overlay.rect.x,
                y = overlay.rect.y,
                width = overlay.rect.width,
                height = overlay.rect.height,
                "Applied overlay gesture"
            ),
            None => debug!(page = page.number, "Ignoring gesture without an overlay"),
        }
        Ok(overlay)
    }

    /// Callers hold the batch control lock.
    pub(super) fn overlay_for(&self, page: &Page) -> Option<Overlay> {
        let aspect_ratio = self.signature.load_full()?.aspect_ratio();
        self.with_controller(page, |controller| {
            controller.ensure_initialized(aspect_ratio)
        })
    }

    fn with_controller<R>(&self, page: &Page, f: impl FnOnce(&mut OverlayController) -> R) -> R {
        let key = PageKey {
            document: page.document,
            number: page.number,
        };
        let mut controller = self
            .overlays
            .entry(key)
            .or_insert_with(|| OverlayController::new(page.container, self.config.overlay.clone()));
        f(controller.value_mut())
    }
}
