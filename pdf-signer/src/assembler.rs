//! Builds output PDFs from page snapshots.
//!
//! Every snapshot becomes one portrait page of a fixed format. The image is
//! scaled to the page width and anchored at the top-left corner; its height
//! follows the snapshot's aspect ratio.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use serde::Deserialize;
use tracing::{debug, info};

use crate::compositor::Snapshot;
use crate::error::AssemblyError;

/// Output page size, portrait orientation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    #[default]
    A4,
    Letter,
}

impl PageFormat {
    /// Width and height in PDF points
    pub fn size_points(self) -> (f64, f64) {
        match self {
            PageFormat::A4 => (595.28, 841.89),
            PageFormat::Letter => (612.0, 792.0),
        }
    }
}

/// Assemble `snapshots` into a PDF, one page per snapshot, in order.
pub fn assemble(snapshots: &[Snapshot], format: PageFormat) -> Result<Vec<u8>, AssemblyError> {
    if snapshots.is_empty() {
        return Err(AssemblyError::NoSnapshots);
    }

    let (page_width, page_height) = format.size_points();
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut page_ids = Vec::with_capacity(snapshots.len());

    for (index, snapshot) in snapshots.iter().enumerate() {
        if snapshot.width == 0 || snapshot.height == 0 || snapshot.jpeg.is_empty() {
            return Err(AssemblyError::InvalidSnapshot { index });
        }

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(snapshot.width),
                "Height" => i64::from(snapshot.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            snapshot.jpeg.to_vec(),
        ));

        // Full page width; taller images run off the bottom edge
        let image_height = page_width * f64::from(snapshot.height) / f64::from(snapshot.width);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        real(page_width),
                        real(0.0),
                        real(0.0),
                        real(image_height),
                        real(0.0),
                        real(page_height - image_height),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(|e| AssemblyError::Write {
            message: e.to_string(),
        })?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![real(0.0), real(0.0), real(page_width), real(page_height)],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
            "Contents" => content_id,
        });
        page_ids.push(page_id);

        debug!(
            page = index + 1,
            image_px = format!("{}x{}", snapshot.width, snapshot.height),
            image_height_pts = image_height,
            "Added page image"
        );
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => page_ids.len() as i64,
        "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| AssemblyError::Write {
        message: e.to_string(),
    })?;
    Ok(buffer)
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// A finished PDF ready to be handed to the user
#[derive(Debug, Clone)]
pub struct OutputPdf {
    pub file_name: String,
    pub bytes: Bytes,
    pub page_count: usize,
}

impl OutputPdf {
    /// Write the PDF into `directory`, creating it if needed.
    pub fn write_to(&self, directory: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(directory)?;
        let path = directory.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        info!(
            path = %path.display(),
            pages = self.page_count,
            bytes = self.bytes.len(),
            "Wrote signed PDF"
        );
        Ok(path)
    }
}

/// `contract` + `_signed` -> `contract_signed.pdf`
pub fn document_file_name(display_name: &str, suffix: &str) -> String {
    format!("{}{}.pdf", display_name, suffix)
}

/// `contract`, page 2 -> `contract Page 2_signed.pdf`
pub fn page_file_name(display_name: &str, page_number: usize, suffix: &str) -> String {
    document_file_name(&format!("{} Page {}", display_name, page_number), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, Rgb, RgbImage};
    use lopdf::ObjectId;

    fn snapshot(width: u32, height: u32) -> Snapshot {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 200, 200]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        Snapshot {
            jpeg: Bytes::from(jpeg),
            width,
            height,
        }
    }

    fn page_dict(doc: &Document, page_id: ObjectId) -> &Dictionary {
        doc.get_object(page_id).unwrap().as_dict().unwrap()
    }

    fn image_width(doc: &Document, page_id: ObjectId) -> i64 {
        let resources = page_dict(doc, page_id)
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
        let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
        stream.dict.get(b"Width").unwrap().as_i64().unwrap()
    }

    #[test]
    fn test_one_page_per_snapshot_in_order() {
        let snapshots = vec![snapshot(10, 14), snapshot(20, 28), snapshot(30, 42)];
        let bytes = assemble(&snapshots, PageFormat::A4).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);

        let widths: Vec<i64> = pages.values().map(|id| image_width(&doc, *id)).collect();
        assert_eq!(widths, vec![10, 20, 30]);
    }

    #[test]
    fn test_pages_use_requested_format() {
        let bytes = assemble(&[snapshot(8, 8)], PageFormat::A4).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();

        let media_box = page_dict(&doc, page_id)
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap();
        assert!((media_box[2].as_float().unwrap() - 595.28).abs() < 0.01);
        assert!((media_box[3].as_float().unwrap() - 841.89).abs() < 0.01);

        let bytes = assemble(&[snapshot(8, 8)], PageFormat::Letter).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let media_box = page_dict(&doc, page_id)
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap();
        assert!((media_box[2].as_float().unwrap() - 612.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(matches!(
            assemble(&[], PageFormat::A4),
            Err(AssemblyError::NoSnapshots)
        ));
    }

    #[test]
    fn test_invalid_snapshot_is_rejected() {
        let empty = Snapshot {
            jpeg: Bytes::new(),
            width: 0,
            height: 0,
        };
        let err = assemble(&[snapshot(4, 4), empty], PageFormat::A4).unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidSnapshot { index: 1 }));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(document_file_name("contract", "_signed"), "contract_signed.pdf");
        assert_eq!(
            page_file_name("contract", 2, "_signed"),
            "contract Page 2_signed.pdf"
        );
    }

    #[test]
    fn test_write_to_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputPdf {
            file_name: "a_signed.pdf".to_string(),
            bytes: Bytes::from_static(b"%PDF-1.7"),
            page_count: 1,
        };
        let path = output.write_to(&dir.path().join("nested")).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.7");
    }
}
