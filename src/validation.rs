//! Guide image validation utilities.
//!
//! This module provides functions to check that composited guide images have
//! the expected size, content and background. Used by the unit tests against
//! the mock SDK and by the hardware integration tests.

use thiserror::Error;

use crate::geometry::{Rect, Size};
use crate::image::{GuideImage, BACKGROUND};

/// A guide image failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Image size differs from the expected frame size.
    #[error("image is {actual:?}, expected {expected:?}")]
    SizeMismatch {
        /// Expected size.
        expected: Size,
        /// Actual size.
        actual: Size,
    },
    /// Pixel outside the sub-frame is not background.
    #[error("pixel ({x}, {y}) outside sub-frame is {value}, expected background")]
    Background {
        /// Column.
        x: u32,
        /// Row.
        y: u32,
        /// Pixel value.
        value: u16,
    },
    /// Pixel inside the sub-frame differs from the expected value.
    #[error("pixel ({x}, {y}) is {actual}, expected {expected}")]
    Pixel {
        /// Column.
        x: u32,
        /// Row.
        y: u32,
        /// Expected value.
        expected: u16,
        /// Actual value.
        actual: u16,
    },
    /// Sub-frame does not lie inside the image.
    #[error("sub-frame {0:?} is outside the image")]
    SubframeOutOfBounds(Rect),
    /// Image has no pixels.
    #[error("image is empty")]
    Empty,
}

/// Basic pixel statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    /// Smallest pixel value.
    pub min: u16,
    /// Largest pixel value.
    pub max: u16,
    /// Mean pixel value.
    pub mean: f64,
}

/// Compute statistics over the whole image, or over `region` when given.
///
/// # Errors
///
/// Returns `Empty` if there are no pixels to measure and
/// `SubframeOutOfBounds` if `region` is not inside the image.
#[allow(clippy::cast_precision_loss)]
pub fn image_stats(image: &GuideImage, region: Option<Rect>) -> Result<ImageStats, ValidationError> {
    let bounds = Rect::from_size(image.size());
    let region = region.unwrap_or(bounds);
    if !bounds.contains(&region) {
        return Err(ValidationError::SubframeOutOfBounds(region));
    }

    let mut min = u16::MAX;
    let mut max = u16::MIN;
    let mut sum = 0u64;
    let mut count = 0u64;
    for_each_pixel(image, region, |_, _, value| {
        min = min.min(value);
        max = max.max(value);
        sum += u64::from(value);
        count += 1;
    });

    if count == 0 {
        return Err(ValidationError::Empty);
    }
    Ok(ImageStats {
        min,
        max,
        mean: sum as f64 / count as f64,
    })
}

/// Validates that an image has the expected frame size.
///
/// # Errors
///
/// Returns `SizeMismatch` if the sizes differ.
pub fn validate_size(image: &GuideImage, expected: Size) -> Result<(), ValidationError> {
    if image.size() == expected {
        Ok(())
    } else {
        Err(ValidationError::SizeMismatch {
            expected,
            actual: image.size(),
        })
    }
}

/// Validates that every pixel outside `subframe` is [`BACKGROUND`].
///
/// # Errors
///
/// Returns `Background` with the first offending pixel in row-major order.
pub fn validate_background(image: &GuideImage, subframe: Rect) -> Result<(), ValidationError> {
    let size = image.size();
    for y in 0..size.height {
        for x in 0..size.width {
            if inside(subframe, x, y) {
                continue;
            }
            let value = image.pixel(x, y).unwrap_or(BACKGROUND);
            if value != BACKGROUND {
                return Err(ValidationError::Background { x, y, value });
            }
        }
    }
    Ok(())
}

/// Validates every pixel inside `subframe` against `expected(x, y)`.
///
/// Coordinates passed to `expected` are image coordinates.
///
/// # Errors
///
/// Returns `SubframeOutOfBounds` if `subframe` is not inside the image and
/// `Pixel` with the first mismatch in row-major order.
pub fn validate_subframe_pixels<F>(
    image: &GuideImage,
    subframe: Rect,
    expected: F,
) -> Result<(), ValidationError>
where
    F: Fn(u32, u32) -> u16,
{
    if subframe.is_empty() || !Rect::from_size(image.size()).contains(&subframe) {
        return Err(ValidationError::SubframeOutOfBounds(subframe));
    }

    let mut mismatch = None;
    for_each_pixel(image, subframe, |x, y, actual| {
        let want = expected(x, y);
        if mismatch.is_none() && actual != want {
            mismatch = Some(ValidationError::Pixel {
                x,
                y,
                expected: want,
                actual,
            });
        }
    });
    mismatch.map_or(Ok(()), Err)
}

fn inside(rect: Rect, x: u32, y: u32) -> bool {
    let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) else {
        return false;
    };
    x >= rect.x && x < rect.right() && y >= rect.y && y < rect.bottom()
}

fn for_each_pixel<F: FnMut(u32, u32, u16)>(image: &GuideImage, region: Rect, mut f: F) {
    let (Ok(x0), Ok(y0)) = (u32::try_from(region.x), u32::try_from(region.y)) else {
        return;
    };
    let size = region.size();
    for y in y0..y0 + size.height {
        for x in x0..x0 + size.width {
            if let Some(value) = image.pixel(x, y) {
                f(x, y, value);
            }
        }
    }
}
