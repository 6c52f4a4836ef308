//! One unit's extraction, end to end.
//!
//! [`UnitProcessor::process`] composes the pipeline stages and classifies the
//! result. Every `StageError` is contained here: the caller always gets a
//! well-formed [`ResultRecord`], and votes are all-or-nothing.

use crate::config::{ExtractionConfig, TableTemplate, ThresholdParams};
use crate::error::{ActaError, StageError};
use crate::model::{Category, UnitDescriptor};
use crate::output::{Outcome, ResultRecord};
use crate::pipeline::fetch::{self, DocumentFetcher, HttpFetcher};
use crate::pipeline::normalize::normalize;
use crate::pipeline::recognize::{read_count, DigitRecognizer, TesseractCli};
use crate::pipeline::region::{isolate_table, segment_rows};
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use image::{DynamicImage, GrayImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Runs the fetch → rasterise → crop → threshold → split → read pipeline for
/// one unit at a time. Shared across workers behind an `Arc`.
pub struct UnitProcessor {
    fetcher: Arc<dyn DocumentFetcher>,
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn DigitRecognizer>,
    template: TableTemplate,
    threshold: ThresholdParams,
    debug_dir: Option<PathBuf>,
}

impl UnitProcessor {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn DigitRecognizer>,
        template: TableTemplate,
        threshold: ThresholdParams,
    ) -> Self {
        Self {
            fetcher,
            rasterizer,
            recognizer,
            template,
            threshold,
            debug_dir: None,
        }
    }

    /// Write each read's intermediate images under `dir`.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    /// Production wiring: HTTP fetcher, pdfium and the tesseract CLI.
    ///
    /// Must be called inside a Tokio runtime (see [`HttpFetcher::new`]).
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ActaError> {
        let processor = Self::new(
            Arc::new(HttpFetcher::new(config)?),
            Arc::new(PdfiumRasterizer::new(config)),
            Arc::new(TesseractCli::from_config(config)),
            config.template.clone(),
            config.threshold,
        );
        Ok(match &config.debug_dir {
            Some(dir) => processor.with_debug_dir(dir),
            None => processor,
        })
    }

    pub fn template(&self) -> &TableTemplate {
        &self.template
    }

    /// Process one unit into exactly one record.
    ///
    /// Units without a document reference short-circuit to `NO_DOCUMENT`
    /// with no fetch, rasterisation or recognition calls.
    pub fn process(&self, unit: &UnitDescriptor) -> ResultRecord {
        let reference = match unit.document.as_deref() {
            Some(r) if unit.has_document() => r,
            _ => {
                debug!("Mesa {}: no document", unit.table_number);
                return ResultRecord::no_document(unit);
            }
        };

        let start = Instant::now();
        match self.extract(unit, reference) {
            Ok(values) => {
                debug!(
                    "Mesa {}: extracted in {}ms",
                    unit.table_number,
                    start.elapsed().as_millis()
                );
                ResultRecord::success(unit, &self.template.rows, values)
            }
            Err(e) => {
                warn!("Mesa {}: extraction failed: {}", unit.table_number, e);
                ResultRecord::failed(unit, Outcome::ExtractionError, e.to_string())
            }
        }
    }

    fn extract(&self, unit: &UnitDescriptor, reference: &str) -> Result<Vec<Option<u32>>, StageError> {
        let name = fetch::local_name(unit, reference);
        let path = self.fetcher.fetch(reference, &name)?;
        self.read_values(&path)
    }

    /// Read a local document into per-row values, in template row order.
    ///
    /// `None` marks a row whose read produced no digits.
    pub fn read_values(&self, path: &Path) -> Result<Vec<Option<u32>>, StageError> {
        let page = self.rasterizer.rasterize(path)?;
        let table = isolate_table(&page, &self.template)?;
        let binary = normalize(&table, self.threshold)?;
        let rows = segment_rows(&binary, self.template.row_count())?;

        if let Some(dir) = &self.debug_dir {
            // Debug output never fails the read.
            if let Err(e) = self.dump_stages(dir, path, &table, &binary, &rows) {
                warn!("Debug images for {} not written: {}", path.display(), e);
            }
        }

        rows.iter()
            .map(|row| read_count(self.recognizer.as_ref(), row))
            .collect()
    }

    /// Save `{stem}_table.png`, `{stem}_binary.png` and one
    /// `{stem}_row{n}_{CODE}.png` per band.
    fn dump_stages(
        &self,
        dir: &Path,
        document: &Path,
        table: &DynamicImage,
        binary: &GrayImage,
        rows: &[GrayImage],
    ) -> Result<(), image::ImageError> {
        std::fs::create_dir_all(dir)?;
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "acta".to_string());

        table.save(dir.join(format!("{stem}_table.png")))?;
        binary.save(dir.join(format!("{stem}_binary.png")))?;
        for (i, (row, category)) in rows.iter().zip(&self.template.rows).enumerate() {
            row.save(dir.join(format!("{stem}_row{}_{}.png", i + 1, category.code())))?;
        }
        debug!("Debug images for {} written to {}", stem, dir.display());
        Ok(())
    }

    /// [`read_values`](Self::read_values) paired with each row's category.
    pub fn read_document(&self, path: &Path) -> Result<Vec<(Category, Option<u32>)>, StageError> {
        let values = self.read_values(path)?;
        Ok(self.template.rows.iter().copied().zip(values).collect())
    }
}
