//! The signature image shared by every overlay in a session.

use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{info, warn};

use crate::error::SignatureError;

/// A decoded signature image.
///
/// Cloning is cheap; all clones share the same pixels and nothing mutates them.
#[derive(Debug, Clone)]
pub struct SignatureAsset {
    pixels: Arc<RgbaImage>,
}

impl SignatureAsset {
    /// Decode a signature from any raster format the `image` crate understands.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let decoded = image::load_from_memory(bytes).map_err(SignatureError::Decode)?;
        Self::from_image(decoded.to_rgba8())
    }

    pub fn from_image(pixels: RgbaImage) -> Result<Self, SignatureError> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(SignatureError::Empty { width, height });
        }
        Ok(Self {
            pixels: Arc::new(pixels),
        })
    }

    pub fn load(path: &Path) -> Result<Self, SignatureError> {
        let bytes = std::fs::read(path).map_err(SignatureError::Io)?;
        Self::from_bytes(&bytes)
    }

    pub fn natural_width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn natural_height(&self) -> u32 {
        self.pixels.height()
    }

    /// Natural width / height
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.natural_width()) / f64::from(self.natural_height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Look for the bundled default signature.
///
/// A missing or unreadable default is not an error: the pipeline simply runs
/// without overlays until a signature is supplied.
pub fn load_default_signature(path: Option<&Path>) -> Option<SignatureAsset> {
    let path = path?;
    if !path.exists() {
        info!(path = %path.display(), "No default signature image found");
        return None;
    }
    match SignatureAsset::load(path) {
        Ok(asset) => {
            info!(
                path = %path.display(),
                width = asset.natural_width(),
                height = asset.natural_height(),
                "Loaded default signature"
            );
            Some(asset)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Default signature could not be loaded");
            None
        }
    }
}
