//! Binarisation of the cropped table before recognition.
//!
//! Gaussian adaptive threshold: each pixel is compared against the
//! Gaussian-weighted mean of its neighbourhood minus `bias`. Pixels above
//! the local threshold become white (255), the rest black (0).

use crate::config::ThresholdParams;
use crate::error::StageError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Convert `image` to grayscale and apply the adaptive threshold.
pub fn normalize(image: &DynamicImage, params: ThresholdParams) -> Result<GrayImage, StageError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(StageError::Normalize("empty image".into()));
    }
    if !params.is_valid() {
        return Err(StageError::Normalize(format!(
            "threshold window must be odd and ≥ 3, got {}",
            params.window
        )));
    }

    let gray = image.to_luma8();
    let mean = gaussian_blur_f32(&gray, params.sigma());
    let bias = params.bias as i32;

    Ok(GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let src = gray.get_pixel(x, y).0[0] as i32;
        let threshold = mean.get_pixel(x, y).0[0] as i32 - bias;
        if src > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    }))
}
