use thiserror::Error;

/// Main pipeline error type
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Document not found: index {index}")]
    DocumentNotFound { index: usize },

    #[error("Page {page} not found in document {document}")]
    PageNotFound { document: String, page: usize },

    #[error("Batch {batch} is still rasterizing")]
    BatchNotReady { batch: u64 },

    #[error("Batch {batch} was replaced by batch {current}")]
    BatchSuperseded { batch: u64, current: u64 },

    #[error("Document {document} failed to rasterize: {message}")]
    DocumentFailed { document: String, message: String },

    #[error("Rasterization failed")]
    Raster(#[from] RasterError),

    #[error("Signature unavailable")]
    Signature(#[from] SignatureError),

    #[error("Snapshot capture failed")]
    Capture(#[from] CaptureError),

    #[error("PDF assembly failed")]
    Assembly(#[from] AssemblyError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

/// Rasterizer errors
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Failed to load PDFium library: {message}")]
    LibraryUnavailable { message: String },

    #[error("Failed to decode PDF: {message}")]
    Decode { message: String },

    #[error("Failed to acquire a drawing surface for page {page}: {message}")]
    RenderSurface { page: usize, message: String },

    #[error("Rasterization task did not complete: {message}")]
    Task { message: String },
}

/// Signature asset errors
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Failed to decode signature image")]
    Decode(#[source] image::ImageError),

    #[error("Signature image has no area ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("Failed to read signature file")]
    Io(#[source] std::io::Error),
}

/// Snapshot capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture region has no area ({width}x{height})")]
    EmptyRegion { width: f64, height: f64 },

    #[error("Overlay ({x}, {y}, {width}x{height}) lies outside its page")]
    OverlayOutOfBounds {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },

    #[error("Failed to encode snapshot")]
    Encode(#[source] image::ImageError),

    #[error("Capture task did not complete: {message}")]
    Task { message: String },
}

/// Output PDF assembly errors
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("No snapshots to assemble")]
    NoSnapshots,

    #[error("Snapshot {index} has no pixels")]
    InvalidSnapshot { index: usize },

    #[error("Failed to write PDF: {message}")]
    Write { message: String },
}

impl SignerError {
    /// Stable identifier for logs and callers that branch on the failure kind
    pub fn error_code(&self) -> &'static str {
        match self {
            SignerError::DocumentNotFound { .. } => "document_not_found",
            SignerError::PageNotFound { .. } => "page_not_found",
            SignerError::BatchNotReady { .. } => "batch_not_ready",
            SignerError::BatchSuperseded { .. } => "batch_superseded",
            SignerError::DocumentFailed { .. } => "document_failed",
            SignerError::Raster(RasterError::LibraryUnavailable { .. }) => "pdfium_unavailable",
            SignerError::Raster(RasterError::Decode { .. }) => "decode_error",
            SignerError::Raster(RasterError::RenderSurface { .. }) => "render_surface_error",
            SignerError::Raster(RasterError::Task { .. }) => "raster_task_error",
            SignerError::Signature(_) => "signature_error",
            SignerError::Capture(CaptureError::OverlayOutOfBounds { .. }) => {
                "overlay_out_of_bounds"
            }
            SignerError::Capture(_) => "capture_error",
            SignerError::Assembly(AssemblyError::NoSnapshots) => "no_snapshots",
            SignerError::Assembly(_) => "assembly_error",
            SignerError::Config { .. } => "config_error",
            SignerError::Io(_) => "io_error",
        }
    }
}

/// Result type alias for pipeline operations
pub type SignerResult<T> = Result<T, SignerError>;

/// Format an error with its full source chain, one cause per line.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str("\n  caused by: ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SignerError::from(RasterError::RenderSurface {
            page: 3,
            message: "no context".to_string(),
        });
        assert_eq!(err.error_code(), "render_surface_error");

        let err = SignerError::from(AssemblyError::NoSnapshots);
        assert_eq!(err.error_code(), "no_snapshots");

        let err = SignerError::BatchNotReady { batch: 2 };
        assert_eq!(err.error_code(), "batch_not_ready");

        let err = SignerError::BatchSuperseded {
            batch: 1,
            current: 2,
        };
        assert_eq!(err.error_code(), "batch_superseded");
    }

    #[test]
    fn test_format_error_chain() {
        let err = SignerError::from(RasterError::Decode {
            message: "not a PDF".to_string(),
        });
        let chain = format_error_chain(&err);
        assert!(chain.starts_with("Rasterization failed"));
        assert!(chain.contains("caused by: Failed to decode PDF: not a PDF"));
    }
}
