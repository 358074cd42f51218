//! Core traits and types for the ASI camera SDK abstraction.

use std::time::Duration;

use thiserror::Error;

/// Camera identifier assigned by the SDK (`CameraID` in the vendor headers).
pub type CameraId = i32;

/// Status codes returned by the camera SDK for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SdkStatus {
    /// No camera connected or index out of range.
    #[error("invalid index")]
    InvalidIndex,
    /// Invalid camera ID.
    #[error("invalid camera id")]
    InvalidId,
    /// Invalid control type.
    #[error("invalid control type")]
    InvalidControlType,
    /// Camera has not been opened.
    #[error("camera closed")]
    CameraClosed,
    /// Camera was removed from the bus.
    #[error("camera removed")]
    CameraRemoved,
    /// Invalid path.
    #[error("invalid path")]
    InvalidPath,
    /// Invalid file format.
    #[error("invalid file format")]
    InvalidFileFormat,
    /// Wrong video format size.
    #[error("invalid size")]
    InvalidSize,
    /// Unsupported image type.
    #[error("invalid image type")]
    InvalidImageType,
    /// Start position is out of boundary.
    #[error("out of boundary")]
    OutOfBoundary,
    /// No data within the wait time.
    #[error("timeout")]
    Timeout,
    /// Call issued in the wrong sequence (e.g. stop before start).
    #[error("invalid sequence")]
    InvalidSequence,
    /// Caller buffer is too small for the frame.
    #[error("buffer too small")]
    BufferTooSmall,
    /// Operation not allowed while video capture is running.
    #[error("video mode active")]
    VideoModeActive,
    /// Operation not allowed while an exposure is in progress.
    #[error("exposure in progress")]
    ExposureInProgress,
    /// General failure reported by the SDK.
    #[error("general error")]
    GeneralError,
    /// Code not known to this crate.
    #[error("unknown status code {0}")]
    Unknown(i32),
}

impl SdkStatus {
    /// Convert a raw SDK return code into a result.
    pub const fn check(code: i32) -> std::result::Result<(), Self> {
        let status = match code {
            0 => return Ok(()),
            1 => Self::InvalidIndex,
            2 => Self::InvalidId,
            3 => Self::InvalidControlType,
            4 => Self::CameraClosed,
            5 => Self::CameraRemoved,
            6 => Self::InvalidPath,
            7 => Self::InvalidFileFormat,
            8 => Self::InvalidSize,
            9 => Self::InvalidImageType,
            10 => Self::OutOfBoundary,
            11 => Self::Timeout,
            12 => Self::InvalidSequence,
            13 => Self::BufferTooSmall,
            14 => Self::VideoModeActive,
            15 => Self::ExposureInProgress,
            16 => Self::GeneralError,
            other => Self::Unknown(other),
        };
        Err(status)
    }
}

/// Result of a single SDK call.
pub type SdkResult<T> = std::result::Result<T, SdkStatus>;

/// Static camera description reported by the SDK before opening.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraInfo {
    /// Model name.
    pub name: String,
    /// ID used by every other SDK call.
    pub camera_id: CameraId,
    /// Sensor width in pixels at binning 1.
    pub max_width: u32,
    /// Sensor height in pixels at binning 1.
    pub max_height: u32,
    /// Whether the sensor has a Bayer matrix.
    pub is_color: bool,
    /// Supported binning factors, in SDK order.
    pub supported_bins: Vec<u32>,
    /// Physical pixel size in microns.
    pub pixel_size_um: f64,
    /// Whether the camera has an ST4 guide port.
    pub has_st4_port: bool,
    /// Whether the camera has a cooler.
    pub is_cooler_cam: bool,
    /// ADC bit depth.
    pub bit_depth: u32,
}

/// SDK control identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlType {
    /// Sensor gain (device units).
    Gain,
    /// Exposure time in microseconds.
    Exposure,
    /// Gamma.
    Gamma,
    /// White balance red.
    WbR,
    /// White balance blue.
    WbB,
    /// Offset / brightness.
    Offset,
    /// USB bandwidth share (percent).
    BandwidthOverload,
    /// Overclock.
    Overclock,
    /// Sensor temperature in tenths of a degree Celsius.
    Temperature,
    /// Image flip.
    Flip,
    /// Auto exposure maximum gain.
    AutoMaxGain,
    /// Auto exposure maximum exposure.
    AutoMaxExposure,
    /// Auto exposure target brightness.
    AutoTargetBrightness,
    /// Hardware binning.
    HardwareBin,
    /// High speed mode.
    HighSpeedMode,
    /// Cooler power percentage.
    CoolerPowerPercent,
    /// Cooler target temperature in degrees Celsius.
    TargetTemp,
    /// Cooler on/off.
    CoolerOn,
    /// Mono binning for color sensors.
    MonoBin,
    /// Fan on/off.
    FanOn,
    /// Pattern adjust.
    PatternAdjust,
    /// Anti-dew heater.
    AntiDewHeater,
    /// Control not known to this crate.
    Other(i32),
}

impl ControlType {
    /// Map a raw SDK control id.
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Gain,
            1 => Self::Exposure,
            2 => Self::Gamma,
            3 => Self::WbR,
            4 => Self::WbB,
            5 => Self::Offset,
            6 => Self::BandwidthOverload,
            7 => Self::Overclock,
            8 => Self::Temperature,
            9 => Self::Flip,
            10 => Self::AutoMaxGain,
            11 => Self::AutoMaxExposure,
            12 => Self::AutoTargetBrightness,
            13 => Self::HardwareBin,
            14 => Self::HighSpeedMode,
            15 => Self::CoolerPowerPercent,
            16 => Self::TargetTemp,
            17 => Self::CoolerOn,
            18 => Self::MonoBin,
            19 => Self::FanOn,
            20 => Self::PatternAdjust,
            21 => Self::AntiDewHeater,
            other => Self::Other(other),
        }
    }

    /// Raw SDK control id.
    pub const fn raw(self) -> i32 {
        match self {
            Self::Gain => 0,
            Self::Exposure => 1,
            Self::Gamma => 2,
            Self::WbR => 3,
            Self::WbB => 4,
            Self::Offset => 5,
            Self::BandwidthOverload => 6,
            Self::Overclock => 7,
            Self::Temperature => 8,
            Self::Flip => 9,
            Self::AutoMaxGain => 10,
            Self::AutoMaxExposure => 11,
            Self::AutoTargetBrightness => 12,
            Self::HardwareBin => 13,
            Self::HighSpeedMode => 14,
            Self::CoolerPowerPercent => 15,
            Self::TargetTemp => 16,
            Self::CoolerOn => 17,
            Self::MonoBin => 18,
            Self::FanOn => 19,
            Self::PatternAdjust => 20,
            Self::AntiDewHeater => 21,
            Self::Other(raw) => raw,
        }
    }
}

/// Capabilities of a single control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCaps {
    /// Control name as reported by the SDK.
    pub name: String,
    /// Control identifier.
    pub control_type: ControlType,
    /// Minimum value.
    pub min_value: i64,
    /// Maximum value.
    pub max_value: i64,
    /// Default value.
    pub default_value: i64,
    /// Whether the control may be set to auto.
    pub is_auto_supported: bool,
    /// Whether the control is writable.
    pub is_writable: bool,
}

/// Image formats understood by `set_roi_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// 8 bits per pixel, raw sensor data.
    Raw8,
    /// 16 bits per pixel, raw sensor data.
    Raw16,
}

impl ImageType {
    /// Raw SDK image type id.
    pub const fn raw(self) -> i32 {
        match self {
            Self::Raw8 => 0,
            Self::Raw16 => 2,
        }
    }
}

/// ST4 guide port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuideDirection {
    /// North (+Dec).
    North,
    /// South (-Dec).
    South,
    /// East (-RA).
    East,
    /// West (+RA).
    West,
}

impl GuideDirection {
    /// All four directions.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// Raw SDK direction id.
    pub const fn raw(self) -> i32 {
        match self {
            Self::North => 0,
            Self::South => 1,
            Self::East => 2,
            Self::West => 3,
        }
    }
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The vendor library could not be loaded.
    #[error("camera SDK unavailable: {0}")]
    SdkUnavailable(String),
    /// No cameras are connected.
    #[error("no ZWO cameras detected")]
    NoCameras,
    /// Requested camera index does not exist.
    #[error("camera {index} not found ({count} connected)")]
    DeviceNotFound {
        /// Requested index.
        index: usize,
        /// Number of connected cameras.
        count: usize,
    },
    /// Camera properties could not be read.
    #[error("failed to get camera properties: {0}")]
    PropertyQueryFailed(SdkStatus),
    /// Camera could not be opened.
    #[error("failed to open camera: {0}")]
    OpenFailed(SdkStatus),
    /// Camera could not be initialised.
    #[error("failed to initialize camera: {0}")]
    InitFailed(SdkStatus),
    /// A frame buffer could not be allocated.
    #[error("failed to allocate {bytes} byte frame buffer")]
    MemoryAllocationFailed {
        /// Requested allocation size.
        bytes: usize,
    },
    /// No frame arrived before the watchdog deadline.
    #[error("capture timed out after {elapsed:?}")]
    CaptureTimeout {
        /// Time spent waiting for the frame.
        elapsed: Duration,
    },
    /// Capture was interrupted through the cancellation token.
    #[error("capture cancelled")]
    CaptureCancelled,
    /// A control value could not be read or written.
    #[error("failed to access control {control:?}: {status}")]
    ControlQueryFailed {
        /// Control that failed.
        control: ControlType,
        /// SDK status.
        status: SdkStatus,
    },
    /// Operation requires a connected camera.
    #[error("camera not connected")]
    NotConnected,
    /// Any other SDK call failed.
    #[error("{operation} failed: {status}")]
    Sdk {
        /// SDK operation name.
        operation: &'static str,
        /// SDK status.
        status: SdkStatus,
    },
}

impl CameraError {
    /// Whether the device must be presumed unusable after this error.
    ///
    /// Fatal errors disconnect the camera; the caller is expected to alert the user.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MemoryAllocationFailed { .. } | Self::CaptureTimeout { .. }
        )
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over the vendor camera SDK.
///
/// Every call mirrors one SDK entry point. Implementations perform no state
/// tracking of their own; the orchestrator in [`crate::camera`] owns that.
pub trait CameraSdk {
    /// Number of connected cameras.
    fn camera_count(&self) -> usize;

    /// Describe the camera at `index` (0-based).
    fn camera_property(&self, index: usize) -> SdkResult<CameraInfo>;

    /// Open a camera.
    fn open(&mut self, id: CameraId) -> SdkResult<()>;

    /// Initialise an opened camera.
    fn init(&mut self, id: CameraId) -> SdkResult<()>;

    /// Close a camera.
    fn close(&mut self, id: CameraId) -> SdkResult<()>;

    /// Number of controls the camera exposes.
    fn num_controls(&self, id: CameraId) -> SdkResult<usize>;

    /// Capabilities of the control at `index`.
    fn control_caps(&self, id: CameraId, index: usize) -> SdkResult<ControlCaps>;

    /// Current value of a control.
    fn control_value(&self, id: CameraId, control: ControlType) -> SdkResult<i64>;

    /// Set a control value.
    fn set_control_value(
        &mut self,
        id: CameraId,
        control: ControlType,
        value: i64,
        auto: bool,
    ) -> SdkResult<()>;

    /// Set readout size (in binned pixels), binning and image type.
    fn set_roi_format(
        &mut self,
        id: CameraId,
        width: u32,
        height: u32,
        bin: u32,
        image_type: ImageType,
    ) -> SdkResult<()>;

    /// Set readout origin (in binned pixels).
    fn set_start_pos(&mut self, id: CameraId, x: u32, y: u32) -> SdkResult<()>;

    /// Enter continuous capture mode.
    fn start_video_capture(&mut self, id: CameraId) -> SdkResult<()>;

    /// Leave continuous capture mode.
    fn stop_video_capture(&mut self, id: CameraId) -> SdkResult<()>;

    /// Wait up to `wait_ms` for the next frame and copy it into `buffer`.
    fn video_data(&mut self, id: CameraId, buffer: &mut [u8], wait_ms: u32) -> SdkResult<()>;

    /// Assert the guide output for `direction`.
    fn pulse_guide_on(&mut self, id: CameraId, direction: GuideDirection) -> SdkResult<()>;

    /// Release the guide output for `direction`.
    fn pulse_guide_off(&mut self, id: CameraId, direction: GuideDirection) -> SdkResult<()>;
}
