//! Flattens a page and its signature overlay into a snapshot image.

use std::io::Cursor;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, Rgb, RgbImage, RgbaImage};
use tracing::debug;

use crate::config::CaptureConfig;
use crate::document::Page;
use crate::error::CaptureError;
use crate::overlay::Overlay;
use crate::signature::SignatureAsset;

/// A signature drawn at an overlay's position
#[derive(Debug, Clone, Copy)]
pub struct SignatureLayer<'a> {
    pub overlay: Overlay,
    pub signature: &'a SignatureAsset,
}

/// The captured visual state of one page, JPEG encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub jpeg: Bytes,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct Compositor {
    scale: f64,
    jpeg_quality: u8,
}

impl Compositor {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            scale: config.scale,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Capture `page` with an optional signature layer on top.
    ///
    /// Output size is the page container scaled by the capture scale. The
    /// operation is pure: identical inputs give identical snapshots.
    pub fn capture(
        &self,
        page: &Page,
        layer: Option<SignatureLayer<'_>>,
    ) -> Result<Snapshot, CaptureError> {
        let container = page.container;
        if !container.is_measurable() {
            return Err(CaptureError::EmptyRegion {
                width: container.width,
                height: container.height,
            });
        }

        let width = ((container.width * self.scale).ceil() as u32).max(1);
        let height = ((container.height * self.scale).ceil() as u32).max(1);

        let base = page.bitmap.pixels();
        let mut canvas: RgbaImage = if base.dimensions() == (width, height) {
            base.clone()
        } else {
            imageops::resize(base, width, height, FilterType::Lanczos3)
        };

        if let Some(layer) = layer {
            let rect = layer.overlay.rect;
            if !rect.is_within(container) {
                return Err(CaptureError::OverlayOutOfBounds {
                    x: rect.x,
                    y: rect.y,
                    width: rect.width,
                    height: rect.height,
                });
            }

            let signature = imageops::resize(
                layer.signature.pixels(),
                scaled_extent(rect.width, self.scale),
                scaled_extent(rect.height, self.scale),
                FilterType::Lanczos3,
            );
            imageops::overlay(
                &mut canvas,
                &signature,
                (rect.x * self.scale).round() as i64,
                (rect.y * self.scale).round() as i64,
            );
        }

        let flattened = flatten_onto_white(&canvas);
        let jpeg = encode_jpeg(&flattened, self.jpeg_quality)?;

        debug!(
            page = page.number,
            width = width,
            height = height,
            bytes = jpeg.len(),
            with_signature = layer.is_some(),
            "Captured page snapshot"
        );

        Ok(Snapshot {
            jpeg: Bytes::from(jpeg),
            width,
            height,
        })
    }
}

fn scaled_extent(length: f64, scale: f64) -> u32 {
    ((length * scale).round() as u32).max(1)
}

/// Composite RGBA over an opaque white background
fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut buffer = Cursor::new(Vec::new());
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(CaptureError::Encode)?;
    Ok(buffer.into_inner())
}
