//! Pipeline configuration loaded from `pdf-signer.toml` and `PDF_SIGNER__*` env vars.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;

use crate::assembler::PageFormat;
use crate::error::{SignerError, SignerResult};
use crate::overlay::Gesture;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub signature: SignatureConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

/// Rasterizer settings
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,

    /// Extra oversampling on top of the device pixel ratio
    #[serde(default = "default_oversampling")]
    pub oversampling: f32,

    /// Directory holding libpdfium. Searched before the default locations.
    #[serde(default)]
    pub library_path: Option<PathBuf>,
}

impl RenderConfig {
    /// Pixels per PDF point used when rasterizing pages
    pub fn scale(&self) -> f32 {
        self.device_pixel_ratio * self.oversampling
    }
}

/// How page containers are laid out for overlay placement
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayoutConfig {
    /// Fixed display width for every page container. When unset, a page's
    /// container is its native size in points.
    #[serde(default)]
    pub container_width: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    /// Initial overlay width as a fraction of the container width
    #[serde(default = "default_initial_width_ratio")]
    pub initial_width_ratio: f64,

    #[serde(default = "default_min_width")]
    pub min_width: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Snapshot pixels per container unit
    #[serde(default = "default_capture_scale")]
    pub scale: f64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_suffix")]
    pub suffix: String,

    #[serde(default)]
    pub page_format: PageFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureConfig {
    /// Bundled default signature, used when present
    #[serde(default)]
    pub default_path: Option<PathBuf>,

    /// Explicitly uploaded signature; replaces the default
    #[serde(default)]
    pub custom_path: Option<PathBuf>,
}

/// One upload batch driven from configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    #[serde(default)]
    pub gestures: Vec<GestureSpec>,

    /// Also export every page as its own one-page PDF
    #[serde(default)]
    pub export_pages: bool,
}

/// A scripted overlay interaction on one page
#[derive(Debug, Clone, Deserialize)]
pub struct GestureSpec {
    /// Position of the document in `batch.inputs` (0-based)
    pub document: usize,
    /// Page number (1-based)
    pub page: usize,
    #[serde(flatten)]
    pub gesture: Gesture,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: default_device_pixel_ratio(),
            oversampling: default_oversampling(),
            library_path: None,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            initial_width_ratio: default_initial_width_ratio(),
            min_width: default_min_width(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            scale: default_capture_scale(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            suffix: default_suffix(),
            page_format: PageFormat::default(),
        }
    }
}

// ==================== Config Loading Functions ====================

/// Load configuration from `pdf-signer.toml` (optional) and env vars
pub fn load_config() -> SignerResult<SignerConfig> {
    build(File::with_name("pdf-signer").required(false))
}

/// Load configuration from an inline TOML document, still honouring env vars
pub fn load_config_from_str(toml: &str) -> SignerResult<SignerConfig> {
    build(File::from_str(toml, FileFormat::Toml))
}

fn build<S>(file: S) -> SignerResult<SignerConfig>
where
    S: config::Source + Send + Sync + 'static,
{
    let config: SignerConfig = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("PDF_SIGNER")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| SignerError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| SignerError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })?;

    config.validate()?;
    Ok(config)
}

impl SignerConfig {
    fn validate(&self) -> SignerResult<()> {
        if self.render.scale() <= 0.0 {
            return Err(SignerError::Config {
                message: "render.device_pixel_ratio and render.oversampling must be positive"
                    .to_string(),
            });
        }
        if !(self.overlay.initial_width_ratio > 0.0 && self.overlay.initial_width_ratio <= 1.0) {
            return Err(SignerError::Config {
                message: "overlay.initial_width_ratio must be in (0, 1]".to_string(),
            });
        }
        if self.capture.scale <= 0.0 {
            return Err(SignerError::Config {
                message: "capture.scale must be positive".to_string(),
            });
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(SignerError::Config {
                message: "capture.jpeg_quality must be in 1..=100".to_string(),
            });
        }
        if self.layout.container_width.is_some_and(|width| width <= 0.0) {
            return Err(SignerError::Config {
                message: "layout.container_width must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ==================== Default Value Functions ====================

fn default_device_pixel_ratio() -> f32 {
    1.0
}

fn default_oversampling() -> f32 {
    2.0
}

fn default_initial_width_ratio() -> f64 {
    0.8
}

fn default_min_width() -> f64 {
    8.0
}

fn default_capture_scale() -> f64 {
    2.0
}

fn default_jpeg_quality() -> u8 {
    100
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("./signed")
}

fn default_suffix() -> String {
    "_signed".to_string()
}
