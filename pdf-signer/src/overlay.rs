//! Signature overlay placement for a single page.
//!
//! Each page owns one [`OverlayController`]. Controllers never share state;
//! the only thing pages have in common is the signature asset they draw.

pub mod geometry;
pub mod gesture;

pub use geometry::{Rect, Size};
pub use gesture::{Gesture, ResizeHandle, apply_gesture};

use tracing::debug;

use crate::config::OverlayConfig;
use geometry::fit_width;

/// Position and size of a signature overlay within its page container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub rect: Rect,
    /// Locked width / height of the signature image
    pub aspect_ratio: f64,
}

impl Overlay {
    /// Default placement: `width_ratio` of the container width, at the origin.
    ///
    /// Returns `None` when the container cannot be measured or the aspect
    /// ratio is unusable. Signatures too tall for the container are shrunk
    /// to its height.
    pub fn initial(aspect_ratio: f64, container: Size, width_ratio: f64) -> Option<Overlay> {
        if !container.is_measurable() || !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
            return None;
        }
        let (width, height) = fit_width(
            container.width * width_ratio,
            container.width,
            container.height,
            aspect_ratio,
        );
        Some(Overlay {
            rect: Rect::new(0.0, 0.0, width, height),
            aspect_ratio,
        })
    }
}

/// Overlay state for one page
#[derive(Debug, Clone)]
pub struct OverlayController {
    container: Size,
    settings: OverlayConfig,
    overlay: Option<Overlay>,
}

impl OverlayController {
    pub fn new(container: Size, settings: OverlayConfig) -> Self {
        Self {
            container,
            settings,
            overlay: None,
        }
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn overlay(&self) -> Option<Overlay> {
        self.overlay
    }

    /// Create the overlay the first time a signature aspect ratio is known.
    ///
    /// Later calls leave an existing overlay untouched.
    pub fn ensure_initialized(&mut self, aspect_ratio: f64) -> Option<Overlay> {
        if self.overlay.is_none() {
            self.overlay = Overlay::initial(
                aspect_ratio,
                self.container,
                self.settings.initial_width_ratio,
            );
            if let Some(overlay) = &self.overlay {
                debug!(
                    width = overlay.rect.width,
                    height = overlay.rect.height,
                    "Initialized signature overlay"
                );
            }
        }
        self.overlay
    }

    /// Apply a drag or resize. Without an overlay this is a no-op.
    pub fn apply(&mut self, gesture: Gesture) -> Option<Overlay> {
        if let Some(current) = self.overlay {
            self.overlay = Some(apply_gesture(
                &current,
                self.container,
                self.settings.min_width,
                gesture,
            ));
        }
        self.overlay
    }

    /// Re-derive the size for a new signature while keeping the position.
    pub fn replace_signature(&mut self, aspect_ratio: f64) -> Option<Overlay> {
        let Some(previous) = self.overlay else {
            return self.ensure_initialized(aspect_ratio);
        };
        self.overlay = Overlay::initial(
            aspect_ratio,
            self.container,
            self.settings.initial_width_ratio,
        )
        .map(|fresh| Overlay {
            rect: Rect {
                x: previous.rect.x,
                y: previous.rect.y,
                ..fresh.rect
            }
            .clamp_position(self.container),
            aspect_ratio,
        });
        self.overlay
    }
}
