//! Sensor geometry and capture region reconciliation.
//!
//! Sub-frame readout is done on a 32-pixel grid: moving or resizing the
//! readout window costs a stop/start of the video stream, and an aligned
//! window keeps the transfer size a multiple of 1024 bytes.

use std::collections::BTreeSet;

/// Alignment unit for sub-frame origin and far corner, in binned pixels.
pub const ALIGNMENT: i32 = 32;

/// Readout width must be a multiple of this.
pub const WIDTH_STEP: u32 = 8;

/// Readout height must be a multiple of this.
pub const HEIGHT_STEP: u32 = 2;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    #[must_use]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Pixel offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    /// Horizontal offset.
    pub x: i32,
    /// Vertical offset.
    pub y: i32,
}

/// Rectangle with inclusive origin and exclusive far edges.
///
/// Width and height are signed: a rectangle with a non-positive side is
/// "empty" and, as a sub-frame request, means "use the full frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole frame of `size`.
    #[must_use]
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, to_i32(size.width), to_i32(size.height))
    }

    /// Whether either side is non-positive.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Exclusive right edge, saturating at `i32::MAX`.
    #[must_use]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `i32::MAX`.
    #[must_use]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Top-left corner.
    #[must_use]
    pub const fn origin(&self) -> Point {
        Point {
            x: self.x,
            y: self.y,
        }
    }

    /// Size, with negative sides reported as zero.
    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(
            u32::try_from(self.width).unwrap_or(0),
            u32::try_from(self.height).unwrap_or(0),
        )
    }

    /// Whether `other` lies entirely inside this rectangle.
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlap of two rectangles, if any.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        (right > x && bottom > y).then(|| Self::new(x, y, right - x, bottom - y))
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

const fn round_down(value: i32, unit: i32) -> i32 {
    value & !(unit - 1)
}

const fn round_up(value: i32, unit: i32) -> i32 {
    round_down(value.saturating_add(unit - 1), unit)
}

/// Device-reported geometry plus the active binning.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceGeometry {
    max_size: Size,
    pixel_size_um: f64,
    supported_bins: BTreeSet<u32>,
    binning: u32,
    full_size: Size,
}

impl DeviceGeometry {
    /// Build geometry from sensor properties.
    ///
    /// Binning 1 is always considered supported. `requested_binning` is
    /// clamped with [`Self::select_binning`].
    #[must_use]
    pub fn new(max_size: Size, pixel_size_um: f64, bins: &[u32], requested_binning: u32) -> Self {
        let mut supported_bins: BTreeSet<u32> = bins.iter().copied().filter(|&b| b > 0).collect();
        supported_bins.insert(1);

        let mut geometry = Self {
            max_size,
            pixel_size_um,
            supported_bins,
            binning: 1,
            full_size: max_size,
        };
        geometry.apply_binning(requested_binning);
        geometry
    }

    /// Sensor size at binning 1.
    #[must_use]
    pub const fn max_size(&self) -> Size {
        self.max_size
    }

    /// Physical pixel size in microns.
    #[must_use]
    pub const fn pixel_size_um(&self) -> f64 {
        self.pixel_size_um
    }

    /// Supported binning factors, ascending.
    #[must_use]
    pub const fn supported_bins(&self) -> &BTreeSet<u32> {
        &self.supported_bins
    }

    /// Largest supported binning factor.
    #[must_use]
    pub fn max_binning(&self) -> u32 {
        self.supported_bins.last().copied().unwrap_or(1)
    }

    /// Active binning factor.
    #[must_use]
    pub const fn binning(&self) -> u32 {
        self.binning
    }

    /// Frame size at the active binning.
    ///
    /// Width is rounded down to [`WIDTH_STEP`] and height to [`HEIGHT_STEP`]
    /// so every readout window clamped to this frame is a valid ROI size.
    #[must_use]
    pub const fn full_size(&self) -> Size {
        self.full_size
    }

    /// Largest supported binning factor not above `requested`.
    #[must_use]
    pub fn select_binning(&self, requested: u32) -> u32 {
        self.supported_bins
            .range(..=requested.max(1))
            .next_back()
            .copied()
            .unwrap_or(1)
    }

    /// Switch to `requested` binning (clamped); returns whether it changed.
    pub fn apply_binning(&mut self, requested: u32) -> bool {
        let binning = self.select_binning(requested);
        let changed = binning != self.binning;
        self.binning = binning;
        let width = self.max_size.width / binning;
        let height = self.max_size.height / binning;
        self.full_size = Size::new(
            width - width % WIDTH_STEP,
            height - height % HEIGHT_STEP,
        );
        changed
    }
}

/// Readout window to request from the device for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    /// Aligned readout window.
    pub frame: Rect,
    /// Requested sub-frame clipped to the full frame; `None` for full-frame reads.
    pub subframe: Option<Rect>,
    /// Position of `subframe` inside `frame`.
    pub offset: Point,
}

impl CaptureRegion {
    /// Full-frame readout.
    #[must_use]
    pub fn full(full_size: Size) -> Self {
        Self {
            frame: Rect::from_size(full_size),
            subframe: None,
            offset: Point::default(),
        }
    }

    /// Compute the readout window for `requested` within a frame of `full_size`.
    ///
    /// An empty request, a request entirely outside the frame, or
    /// `use_subframes == false` yields the full frame. Otherwise the request is
    /// clipped to the frame and grown outward to the alignment grid; a far edge
    /// that would cross the frame boundary is clamped to that boundary.
    #[must_use]
    pub fn compute(requested: Rect, full_size: Size, use_subframes: bool) -> Self {
        if !use_subframes || requested.is_empty() {
            return Self::full(full_size);
        }

        let full = Rect::from_size(full_size);
        let Some(subframe) = full.intersect(&requested) else {
            return Self::full(full_size);
        };

        let left = round_down(subframe.x, ALIGNMENT);
        let top = round_down(subframe.y, ALIGNMENT);
        let right = round_up(subframe.right(), ALIGNMENT).min(full.right());
        let bottom = round_up(subframe.bottom(), ALIGNMENT).min(full.bottom());

        Self {
            frame: Rect::new(left, top, right - left, bottom - top),
            subframe: Some(subframe),
            offset: Point {
                x: subframe.x - left,
                y: subframe.y - top,
            },
        }
    }

    /// Number of pixels transferred for this window.
    #[must_use]
    pub fn frame_pixels(&self) -> usize {
        self.frame.size().area()
    }
}

/// What changed between the active readout configuration and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeChange {
    /// Window size differs.
    pub size_changed: bool,
    /// Window origin differs.
    pub position_changed: bool,
    /// Binning differs.
    pub binning_changed: bool,
}

impl ModeChange {
    /// Compare the active window with the next one.
    #[must_use]
    pub fn between(active: &Rect, next: &Rect, binning_changed: bool) -> Self {
        Self {
            size_changed: active.size() != next.size(),
            position_changed: active.origin() != next.origin(),
            binning_changed,
        }
    }

    /// Streaming must be stopped and the ROI format pushed again.
    #[must_use]
    pub const fn requires_reconfigure(self) -> bool {
        self.size_changed || self.binning_changed
    }

    /// Nothing to push to the device.
    #[must_use]
    pub const fn is_noop(self) -> bool {
        !(self.size_changed || self.position_changed || self.binning_changed)
    }
}
