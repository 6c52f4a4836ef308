//! Rasterisation: render the first page of an acta to a `DynamicImage`.
//!
//! pdfium is a C++ library with thread-local state; the orchestrator already
//! runs each unit on a `spawn_blocking` thread, so rendering here is a plain
//! blocking call. A fresh binding is made per document, which keeps the
//! rasteriser free of shared mutable state between workers.
//!
//! Scale is `dpi / 72` (PDF user space is 72 units per inch), with the longest
//! edge capped by `max_rendered_pixels` so an oversized page cannot exhaust
//! memory.

use crate::config::ExtractionConfig;
use crate::error::StageError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Converts the first page of a document to a raster image.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, path: &Path) -> Result<DynamicImage, StageError>;
}

/// pdfium-backed rasteriser.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            library: config.pdfium_library.clone(),
        }
    }

    fn bind(&self) -> Result<Pdfium, StageError> {
        let bindings = match &self.library {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| StageError::PdfiumUnavailable(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    /// Scale factor from PDF points to pixels.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, path: &Path) -> Result<DynamicImage, StageError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| StageError::Rasterize {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(StageError::EmptyDocument {
                path: path.to_path_buf(),
            });
        }

        let page = pages.get(0).map_err(|e| StageError::Rasterize {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.scale())
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| StageError::Rasterize {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered {} → {}x{} px",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
