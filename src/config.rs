//! Configuration types for acta extraction runs.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The document layout lives in a
//! [`TableTemplate`] so a new acta format is a new descriptor (in code or as
//! a JSON file), not an edit to the pipeline.

use crate::error::ActaError;
use crate::model::Category;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use acta_tally::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .concurrency(8)
///     .store_dir("actas_pdf")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 300);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for the first page. Range: 72–600. Default: 300.
    ///
    /// The template geometry is fractional, so DPI only affects how many
    /// pixels each digit gets; tesseract reads printed digits best near 300.
    pub dpi: u32,

    /// Longest-edge cap for the rendered raster in pixels. Default: 5000.
    pub max_rendered_pixels: u32,

    /// Number of units processed at once. Default: 4.
    pub concurrency: usize,

    /// Layout descriptor: table rectangle and row order.
    pub template: TableTemplate,

    /// Adaptive-threshold parameters for binarisation.
    pub threshold: ThresholdParams,

    /// Directory of the local document store. Default: `actas_pdf`.
    pub store_dir: PathBuf,

    /// Base URL joined onto relative document references.
    pub document_base_url: Option<String>,

    /// Per-download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Retries for transient download failures. Default: 2, at most
    /// [`MAX_FETCH_RETRIES`].
    pub max_fetch_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Explicit libpdfium path; the system library is used when `None`.
    pub pdfium_library: Option<PathBuf>,

    /// Tesseract executable. Default: `tesseract`.
    pub tesseract_bin: PathBuf,

    /// Tesseract language pack. Default: `eng`.
    pub ocr_language: String,

    /// When set, every read writes its table crop, binarised table and row
    /// bands here as PNGs.
    pub debug_dir: Option<PathBuf>,

    /// Per-unit progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 5000,
            concurrency: 4,
            template: TableTemplate::default(),
            threshold: ThresholdParams::default(),
            store_dir: PathBuf::from("actas_pdf"),
            document_base_url: None,
            download_timeout_secs: 120,
            max_fetch_retries: 2,
            retry_backoff_ms: 500,
            pdfium_library: None,
            tesseract_bin: PathBuf::from("tesseract"),
            ocr_language: "eng".to_string(),
            debug_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("template", &self.template.name)
            .field("threshold", &self.threshold)
            .field("store_dir", &self.store_dir)
            .field("document_base_url", &self.document_base_url)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_fetch_retries", &self.max_fetch_retries)
            .field("pdfium_library", &self.pdfium_library)
            .field("tesseract_bin", &self.tesseract_bin)
            .field("debug_dir", &self.debug_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Upper bound for [`ExtractionConfig::max_fetch_retries`].
pub const MAX_FETCH_RETRIES: u32 = 10;

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn template(mut self, template: TableTemplate) -> Self {
        self.config.template = template;
        self
    }

    pub fn threshold(mut self, params: ThresholdParams) -> Self {
        self.config.threshold = params;
        self
    }

    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.store_dir = dir.into();
        self
    }

    pub fn document_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.document_base_url = Some(url.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_fetch_retries(mut self, n: u32) -> Self {
        self.config.max_fetch_retries = n.min(MAX_FETCH_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn tesseract_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_bin = path.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.debug_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ActaError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ActaError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ActaError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        c.template.validate()?;
        c.threshold.validate()?;
        Ok(self.config)
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// A rectangle expressed as fractions of the image width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionalRect {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl FractionalRect {
    /// Pixel bounds `(x, y, width, height)` inside a `width × height` image.
    ///
    /// Edges truncate toward zero, so a rectangle can collapse to zero size
    /// on very small images; callers treat that as a failed crop.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = (width as f64 * self.left) as u32;
        let x1 = (width as f64 * self.right) as u32;
        let y0 = (height as f64 * self.top) as u32;
        let y1 = (height as f64 * self.bottom) as u32;
        (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    fn validate(&self) -> Result<(), ActaError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(self.left) && in_unit(self.right) && in_unit(self.top) && in_unit(self.bottom))
        {
            return Err(ActaError::InvalidConfig(format!(
                "Region fractions must lie in 0–1, got {self:?}"
            )));
        }
        if self.left >= self.right || self.top >= self.bottom {
            return Err(ActaError::InvalidConfig(format!(
                "Region must have left < right and top < bottom, got {self:?}"
            )));
        }
        Ok(())
    }
}

/// Named layout contract for one acta format.
///
/// `rows` lists the categories top-to-bottom as printed; its length is the
/// number of equal-height bands the table is split into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableTemplate {
    pub name: String,
    pub region: FractionalRect,
    pub rows: Vec<Category>,
}

impl Default for TableTemplate {
    fn default() -> Self {
        Self::presidential()
    }
}

impl TableTemplate {
    /// The 2025 presidential acta: party rows followed by blank, void, total.
    pub fn presidential() -> Self {
        Self {
            name: "presidential-2025".to_string(),
            region: FractionalRect {
                left: 0.10,
                right: 0.63,
                top: 0.43,
                bottom: 0.78,
            },
            rows: Category::ALL.to_vec(),
        }
    }

    /// Load a template descriptor from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ActaError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ActaError::TemplateLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let template: TableTemplate =
            serde_json::from_str(&raw).map_err(|e| ActaError::TemplateLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        template.validate()?;
        Ok(template)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows must be a permutation of every category so each record carries
    /// the full key set.
    pub fn validate(&self) -> Result<(), ActaError> {
        self.region.validate()?;
        let mut sorted = self.rows.clone();
        sorted.sort();
        if sorted != Category::ALL {
            return Err(ActaError::InvalidConfig(format!(
                "Template '{}' rows must list every category exactly once, got {:?}",
                self.name, self.rows
            )));
        }
        Ok(())
    }
}

/// Parameters for Gaussian adaptive thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdParams {
    /// Neighbourhood size in pixels; odd, ≥ 3. Default: 35.
    pub window: u32,
    /// Subtracted from the local mean before comparing. Default: 11.
    pub bias: i16,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            window: 35,
            bias: 11,
        }
    }
}

impl ThresholdParams {
    /// Gaussian sigma for the window, using the usual `ksize → sigma` rule.
    pub fn sigma(&self) -> f32 {
        0.3 * ((self.window as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }

    /// Window is odd and at least 3.
    pub fn is_valid(&self) -> bool {
        self.window >= 3 && self.window % 2 == 1
    }

    fn validate(&self) -> Result<(), ActaError> {
        if !self.is_valid() {
            return Err(ActaError::InvalidConfig(format!(
                "Threshold window must be odd and ≥ 3, got {}",
                self.window
            )));
        }
        Ok(())
    }
}
