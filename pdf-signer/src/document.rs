//! Uploaded documents and their rasterized pages.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use image::{ImageEncoder, RgbaImage};
use tracing::warn;
use uuid::Uuid;

use crate::overlay::Size;

/// Identifier of an uploaded document, unique within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One uploaded PDF. Never mutated once rasterization starts.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub display_name: String,
    pub content: Bytes,
}

impl Document {
    pub fn new(file_name: &str, content: impl Into<Bytes>) -> Self {
        Self {
            id: DocumentId::new(),
            display_name: display_name(file_name),
            content: content.into(),
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(&file_name, content))
    }
}

/// Read a batch of input files, one document per path and in the same order.
///
/// A file that cannot be read keeps its place as an empty document, which
/// then fails to decode like any other broken upload.
pub fn read_inputs(paths: &[PathBuf]) -> Vec<Document> {
    paths
        .iter()
        .map(|path| {
            Document::from_path(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Input could not be read");
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Document::new(&file_name, Bytes::new())
            })
        })
        .collect()
}

/// Strip the final extension from a file name: `"report.v2.pdf"` -> `"report.v2"`.
pub fn display_name(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(dot) if dot + 1 < file_name.len() && !file_name[dot + 1..].contains('/') => {
            file_name[..dot].to_string()
        }
        _ => file_name.to_string(),
    }
}

/// Immutable raster of one page
#[derive(Debug, Clone)]
pub struct PageBitmap {
    pixels: Arc<RgbaImage>,
}

impl PageBitmap {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Lossless PNG encoding of the bitmap
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut buffer).write_image(
            self.pixels.as_raw(),
            self.width(),
            self.height(),
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(buffer.into_inner())
    }

    /// `data:image/png;base64,...` form for embedding in a page view
    pub fn to_data_uri(&self) -> Result<String, image::ImageError> {
        let png = self.to_png()?;
        Ok(format!(
            "data:{};base64,{}",
            mime::IMAGE_PNG,
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

/// One rasterized page. `number` is 1-based.
#[derive(Debug, Clone)]
pub struct Page {
    pub document: DocumentId,
    pub number: usize,
    pub bitmap: PageBitmap,
    /// Rendered container size that overlays are positioned in
    pub container: Size,
}

impl Page {
    /// Lay out a bitmap rendered at `raster_scale` pixels per point.
    ///
    /// Without a fixed `container_width` the container is the page's native
    /// size in points; otherwise the page is scaled to that width.
    pub fn new(
        document: DocumentId,
        number: usize,
        bitmap: PageBitmap,
        raster_scale: f32,
        container_width: Option<f64>,
    ) -> Self {
        let native_width = f64::from(bitmap.width()) / f64::from(raster_scale);
        let native_height = f64::from(bitmap.height()) / f64::from(raster_scale);
        let container = match container_width {
            Some(width) if native_width > 0.0 => {
                Size::new(width, native_height * width / native_width)
            }
            _ => Size::new(native_width, native_height),
        };
        Self {
            document,
            number,
            bitmap,
            container,
        }
    }
}

/// Key of a page within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub document: DocumentId,
    pub number: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("doc.pdf"), "doc");
        assert_eq!(display_name("report.v2.pdf"), "report.v2");
        assert_eq!(display_name("no_extension"), "no_extension");
        assert_eq!(display_name("trailing."), "trailing.");
    }

    #[test]
    fn test_document_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let document = Document::from_path(&path).unwrap();
        assert_eq!(document.display_name, "contract");
        assert_eq!(&document.content[..], b"%PDF-1.7");
    }

    #[test]
    fn test_unreadable_input_keeps_its_position() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("second.pdf");
        std::fs::write(&present, b"%PDF-1.7").unwrap();

        let documents = read_inputs(&[dir.path().join("missing.pdf"), present]);
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].display_name, "missing");
        assert!(documents[0].content.is_empty());
        assert_eq!(documents[1].display_name, "second");
        assert_eq!(&documents[1].content[..], b"%PDF-1.7");
    }

    #[test]
    fn test_page_container_native() {
        let bitmap = PageBitmap::new(RgbaImage::new(1224, 1584));
        let page = Page::new(DocumentId::new(), 1, bitmap, 2.0, None);
        assert_eq!(page.container, Size::new(612.0, 792.0));
    }

    #[test]
    fn test_page_container_fixed_width() {
        let bitmap = PageBitmap::new(RgbaImage::new(1224, 1584));
        let page = Page::new(DocumentId::new(), 1, bitmap, 2.0, Some(306.0));
        assert_eq!(page.container, Size::new(306.0, 396.0));
    }

    #[test]
    fn test_data_uri_is_lossless_png() {
        let bitmap = PageBitmap::new(RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255])));
        let uri = bitmap.to_data_uri().unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));

        let png = bitmap.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(&decoded, bitmap.pixels());
    }
}
