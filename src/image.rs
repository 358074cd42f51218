//! Guide image buffer, frame compositing and post-processing hooks.

use crate::geometry::{CaptureRegion, Rect, Size};
use crate::traits::{CameraError, Result};

/// Value of pixels outside a captured sub-frame.
pub const BACKGROUND: u16 = 0;

/// Full-resolution 16-bit image written by a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuideImage {
    size: Size,
    pixels: Vec<u16>,
    subframe: Option<Rect>,
}

impl GuideImage {
    /// Create an empty image; captures size it on demand.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the image for a frame of `size`.
    ///
    /// The allocation is only replaced when the size changes, and is made
    /// fallibly so that an oversized frame surfaces as an error instead of an
    /// abort. Any recorded sub-frame is cleared.
    pub fn init(&mut self, size: Size) -> Result<()> {
        self.subframe = None;
        let len = size.area();
        if self.size == size && self.pixels.len() == len {
            return Ok(());
        }

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| CameraError::MemoryAllocationFailed {
                bytes: len.saturating_mul(std::mem::size_of::<u16>()),
            })?;
        pixels.resize(len, BACKGROUND);

        self.pixels = pixels;
        self.size = size;
        Ok(())
    }

    /// Image size.
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }

    /// Row-major pixel data.
    #[must_use]
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Mutable row-major pixel data.
    pub fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.pixels
    }

    /// Sub-frame the last capture was read from, if any.
    #[must_use]
    pub const fn subframe(&self) -> Option<Rect> {
        self.subframe
    }

    /// Pixel at (`x`, `y`).
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let index = y as usize * self.size.width as usize + x as usize;
        self.pixels.get(index).copied()
    }

    /// Set every pixel to [`BACKGROUND`].
    pub fn clear(&mut self) {
        self.pixels.fill(BACKGROUND);
    }
}

/// Widen a full-frame readout into `image`.
pub fn composite_full(image: &mut GuideImage, raw: &[u8]) {
    image.subframe = None;
    for (dst, &src) in image.pixels.iter_mut().zip(raw) {
        *dst = u16::from(src);
    }
}

/// Copy the requested sub-frame out of an aligned readout into `image`.
///
/// The image is cleared first; only the requested rectangle is written, so
/// everything around it reads as [`BACKGROUND`]. Regions without a sub-frame
/// fall back to [`composite_full`].
pub fn composite_subframe(image: &mut GuideImage, raw: &[u8], region: &CaptureRegion) {
    let Some(subframe) = region.subframe else {
        composite_full(image, raw);
        return;
    };

    image.clear();
    image.subframe = Some(subframe);

    let frame_width = region.frame.size().width as usize;
    let image_width = image.size.width as usize;
    let size = subframe.size();
    let row_len = size.width as usize;
    let (Ok(src_x), Ok(src_y)) = (usize::try_from(region.offset.x), usize::try_from(region.offset.y)) else {
        return;
    };
    let (Ok(dst_x), Ok(dst_y)) = (usize::try_from(subframe.x), usize::try_from(subframe.y)) else {
        return;
    };

    for row in 0..size.height as usize {
        let src_start = (row + src_y) * frame_width + src_x;
        let dst_start = (row + dst_y) * image_width + dst_x;
        let (Some(src), Some(dst)) = (
            raw.get(src_start..src_start + row_len),
            image.pixels.get_mut(dst_start..dst_start + row_len),
        ) else {
            break;
        };
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = u16::from(s);
        }
    }
}

/// Post-capture processing invoked on the composited image.
///
/// Dark-frame libraries and debayering live outside this crate; the camera
/// only decides when to call them.
pub trait FrameProcessor {
    /// Subtract the matching dark frame.
    fn subtract_dark(&mut self, image: &mut GuideImage);

    /// Reconstruct a luminance image from Bayer data.
    fn reconstruct_color(&mut self, image: &mut GuideImage);
}

/// Processor that leaves images untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProcessing;

impl FrameProcessor for NoProcessing {
    fn subtract_dark(&mut self, _image: &mut GuideImage) {}

    fn reconstruct_color(&mut self, _image: &mut GuideImage) {}
}
