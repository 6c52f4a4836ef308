//! Fixed-geometry table isolation and row segmentation.
//!
//! Both steps are purely geometric. The crop follows the template's
//! fractional rectangle and is not content-aware: an acta that deviates from
//! the template yields a meaningless crop rather than an error. The only
//! failures are degenerate sizes (an empty crop, or fewer pixel rows than
//! table rows), which would otherwise feed empty images to the recogniser.

use crate::config::TableTemplate;
use crate::error::StageError;
use image::{DynamicImage, GenericImageView, GrayImage};
use tracing::debug;

/// Crop `image` to the template's table rectangle.
pub fn isolate_table(image: &DynamicImage, template: &TableTemplate) -> Result<DynamicImage, StageError> {
    let (width, height) = image.dimensions();
    let (x, y, w, h) = template.region.to_pixels(width, height);
    if w == 0 || h == 0 {
        return Err(StageError::Region { width, height });
    }
    debug!(
        "Table crop ({}): x={} y={} {}x{} of {}x{}",
        template.name, x, y, w, h, width, height
    );
    Ok(image.crop_imm(x, y, w, h))
}

/// Split `table` into `row_count` equal-height bands, top to bottom.
///
/// Band height is `height / row_count` (integer division); leftover pixel
/// rows at the bottom are discarded.
pub fn segment_rows(table: &GrayImage, row_count: usize) -> Result<Vec<GrayImage>, StageError> {
    let (width, height) = table.dimensions();
    let segment_err = StageError::Segment {
        height,
        rows: row_count,
    };
    if row_count == 0 || width == 0 {
        return Err(segment_err);
    }
    let band = height / row_count as u32;
    if band == 0 {
        return Err(segment_err);
    }

    Ok((0..row_count as u32)
        .map(|i| image::imageops::crop_imm(table, 0, band * i, width, band).to_image())
        .collect())
}
