//! PDF rasterization.
//!
//! Turns a PDF byte stream into one bitmap per page, in page order, at a
//! fixed oversampling scale. Pages of one document render strictly one
//! after another; separate documents may rasterize concurrently.

pub mod pdfium;

use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info};

use crate::document::{Document, Page, PageBitmap};
use crate::error::RasterError;

pub use pdfium::PdfiumBackend;

/// A decoded document whose pages can be drawn one at a time
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Native page size in PDF points
    fn page_size(&self, index: usize) -> Result<(f32, f32), RasterError>;

    /// Draw page `index` (0-based) onto a fresh surface of the given pixel size
    fn render(&mut self, index: usize, width: u32, height: u32) -> Result<RgbaImage, RasterError>;
}

/// Decodes PDF bytes and renders every page
pub trait RenderBackend: Send + Sync + 'static {
    /// Render all pages in order at `scale` pixels per point.
    fn rasterize(&self, content: &[u8], scale: f32) -> Result<Vec<RgbaImage>, RasterError>;
}

/// Render every page of `source` sequentially.
///
/// Any page failure aborts the whole document; a partial page list is never
/// returned.
pub fn render_pages(source: &mut dyn PageSource, scale: f32) -> Result<Vec<RgbaImage>, RasterError> {
    let page_count = source.page_count();
    let mut bitmaps = Vec::with_capacity(page_count);

    for index in 0..page_count {
        let (width_pts, height_pts) = source.page_size(index)?;
        let width = pixel_extent(width_pts, scale);
        let height = pixel_extent(height_pts, scale);

        debug!(
            page = index + 1,
            size_pts = format!("{:.1}x{:.1}", width_pts, height_pts),
            size_px = format!("{}x{}", width, height),
            "Rendering page"
        );

        bitmaps.push(source.render(index, width, height)?);
    }

    Ok(bitmaps)
}

/// Pixel extent of a length in points at `scale` pixels per point
pub fn pixel_extent(points: f32, scale: f32) -> u32 {
    ((points * scale).ceil() as u32).max(1)
}

/// Async front end that keeps blocking renders off the runtime threads
#[derive(Clone)]
pub struct Rasterizer {
    backend: Arc<dyn RenderBackend>,
    scale: f32,
    container_width: Option<f64>,
}

impl Rasterizer {
    pub fn new(backend: Arc<dyn RenderBackend>, scale: f32, container_width: Option<f64>) -> Self {
        Self {
            backend,
            scale,
            container_width,
        }
    }

    /// Rasterize one document into its ordered pages (numbered from 1).
    pub async fn rasterize(&self, document: &Document) -> Result<Vec<Page>, RasterError> {
        let backend = Arc::clone(&self.backend);
        let content = document.content.clone();
        let scale = self.scale;

        let bitmaps = tokio::task::spawn_blocking(move || backend.rasterize(&content, scale))
            .await
            .map_err(|e| RasterError::Task {
                message: e.to_string(),
            })??;

        info!(
            document = %document.display_name,
            pages = bitmaps.len(),
            "Rasterized document"
        );

        Ok(bitmaps
            .into_iter()
            .enumerate()
            .map(|(index, pixels)| {
                Page::new(
                    document.id,
                    index + 1,
                    PageBitmap::new(pixels),
                    scale,
                    self.container_width,
                )
            })
            .collect())
    }
}
