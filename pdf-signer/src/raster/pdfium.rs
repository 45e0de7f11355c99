//! PDFium-backed rendering (dynamically linked).

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use tracing::debug;

use super::{PageSource, RenderBackend, render_pages};
use crate::error::RasterError;

/// PDFium initialisation and teardown are process-global.
static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// Renders pages through a PDFium library loaded at runtime.
///
/// Searches for libpdfium in:
/// 1. The configured library directory, if any
/// 2. Current directory (./libpdfium.so)
/// 3. vendor/pdfium/lib/
/// 4. System library paths
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, RasterError> {
        let configured = self.library_path.as_ref().map(|dir| {
            let dir = dir.to_string_lossy();
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&*dir))
        });

        let bindings = match configured {
            Some(Ok(bindings)) => Ok(bindings),
            _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                        "./vendor/pdfium/lib/",
                    ))
                })
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| RasterError::LibraryUnavailable {
            message: format!("{:?}", e),
        })?;

        Ok(Pdfium::new(bindings))
    }
}

impl RenderBackend for PdfiumBackend {
    fn rasterize(&self, content: &[u8], scale: f32) -> Result<Vec<RgbaImage>, RasterError> {
        let _guard = PDFIUM_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(content, None)
            .map_err(|e| RasterError::Decode {
                message: format!("{:?}", e),
            })?;

        debug!(pages = document.pages().len(), "Loaded PDF into PDFium");

        let mut pages = PdfiumPages { document };
        render_pages(&mut pages, scale)
    }
}

struct PdfiumPages<'doc> {
    document: PdfDocument<'doc>,
}

impl<'doc> PdfiumPages<'doc> {
    fn page(&self, index: usize) -> Result<PdfPage<'doc>, RasterError> {
        let page_index = PdfPageIndex::try_from(index).map_err(|_| RasterError::Decode {
            message: format!("page index {} out of range", index),
        })?;
        self.document
            .pages()
            .get(page_index)
            .map_err(|e| RasterError::Decode {
                message: format!("Failed to get page {}: {:?}", index + 1, e),
            })
    }
}

impl PageSource for PdfiumPages<'_> {
    fn page_count(&self) -> usize {
        usize::from(self.document.pages().len())
    }

    fn page_size(&self, index: usize) -> Result<(f32, f32), RasterError> {
        let page = self.page(index)?;
        Ok((page.width().value, page.height().value))
    }

    fn render(&mut self, index: usize, width: u32, height: u32) -> Result<RgbaImage, RasterError> {
        let page = self.page(index)?;
        let surface_error = |message: String| RasterError::RenderSurface {
            page: index + 1,
            message,
        };

        let config = PdfRenderConfig::new()
            .set_target_width(i32::try_from(width).map_err(|e| surface_error(e.to_string()))?)
            .set_target_height(i32::try_from(height).map_err(|e| surface_error(e.to_string()))?);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| surface_error(format!("{:?}", e)))?;

        // pdfium-render's conversion handles the BGRA channel order
        let image: DynamicImage = bitmap.as_image();
        Ok(image.to_rgba8())
    }
}
