//! Guide-camera orchestrator: connect, capture, cooler and guide port.
//!
//! The camera is kept in continuous video mode between captures and used as a
//! pseudo-snap device: each capture flushes frames buffered while the guider
//! was busy and waits for the next one. Streaming stops only when the readout
//! size or binning changes, on cancellation or timeout, and on disconnect.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::acquisition::{
    flush_buffered_frames, poll_interval_ms, wait_for_frame, AcquireOutcome, CancellationToken,
    Watchdog,
};
use crate::config::CameraConfig;
use crate::controls::{exposure_us, read_cooler_status, sync_control, CoolerStatus};
use crate::geometry::{CaptureRegion, ModeChange, Rect};
use crate::image::{composite_full, composite_subframe, FrameProcessor, GuideImage, NoProcessing};
use crate::session::{DeviceSession, SessionInfo};
use crate::traits::{
    CameraError, CameraSdk, ControlType, GuideDirection, ImageType, Result, SdkStatus,
};

/// Which camera to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraSelector {
    /// First camera found.
    #[default]
    Default,
    /// Camera at this 0-based index.
    Index(usize),
}

impl FromStr for CameraSelector {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("default") {
            return Ok(Self::Default);
        }
        s.parse().map(Self::Index)
    }
}

impl fmt::Display for CameraSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// One entry of the camera list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraEntry {
    /// Selector that connects to this camera.
    pub selector: CameraSelector,
    /// Display name.
    pub name: String,
}

/// Per-capture processing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureOptions {
    /// Subtract the dark frame.
    pub subtract_dark: bool,
    /// Reconstruct color data (color sensors at binning 1 only).
    pub reconstruct_color: bool,
}

/// ZWO ASI guide camera.
pub struct ZwoCamera<S: CameraSdk> {
    sdk: S,
    config: CameraConfig,
    binning: u32,
    gain_percent: u32,
    processor: Box<dyn FrameProcessor>,
    session: Option<DeviceSession>,
}

impl<S: CameraSdk> fmt::Debug for ZwoCamera<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZwoCamera")
            .field("config", &self.config)
            .field("binning", &self.binning)
            .field("gain_percent", &self.gain_percent)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<S: CameraSdk> ZwoCamera<S> {
    /// Wrap an SDK. Binning and gain start from `config`.
    pub fn new(sdk: S, config: CameraConfig) -> Self {
        Self {
            sdk,
            binning: config.binning.max(1),
            gain_percent: config.gain_percent.min(100),
            config,
            processor: Box::new(NoProcessing),
            session: None,
        }
    }

    /// Use `processor` for dark subtraction and color reconstruction.
    #[must_use]
    pub fn with_processor(mut self, processor: Box<dyn FrameProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Underlying SDK.
    pub const fn sdk(&self) -> &S {
        &self.sdk
    }

    /// Whether a camera is connected.
    pub const fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the camera is in continuous capture mode.
    pub fn is_streaming(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.streaming)
    }

    /// Summary of the connected camera.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.as_ref().map(DeviceSession::info)
    }

    /// Requested binning; applied at the next capture.
    pub fn set_binning(&mut self, binning: u32) {
        self.binning = binning.max(1);
    }

    /// Active binning when connected, requested binning otherwise.
    pub fn binning(&self) -> u32 {
        self.session
            .as_ref()
            .map_or(self.binning, |s| s.geometry.binning())
    }

    /// Guide gain percentage used by the next capture (clamped to 100).
    pub fn set_gain_percent(&mut self, pct: u32) {
        self.gain_percent = pct.min(100);
    }

    /// Guide gain percentage.
    pub const fn gain_percent(&self) -> u32 {
        self.gain_percent
    }

    /// Unbinned pixel size in microns.
    pub fn device_pixel_size(&self) -> Result<f64> {
        self.session
            .as_ref()
            .map(|s| s.geometry.pixel_size_um())
            .ok_or(CameraError::NotConnected)
    }

    /// List connected cameras.
    ///
    /// When several cameras are present names carry a 1-based prefix.
    pub fn list_cameras(&self) -> Vec<CameraEntry> {
        let count = self.sdk.camera_count();
        (0..count)
            .filter_map(|index| {
                let info = self.sdk.camera_property(index).ok()?;
                let name = if count > 1 {
                    format!("{}: {}", index + 1, info.name)
                } else {
                    info.name
                };
                Some(CameraEntry {
                    selector: CameraSelector::Index(index),
                    name,
                })
            })
            .collect()
    }

    /// Open, initialise and configure a camera for full-frame readout.
    pub fn connect(&mut self, selector: CameraSelector) -> Result<SessionInfo> {
        if self.is_connected() {
            self.disconnect();
        }

        let index = match selector {
            CameraSelector::Default => 0,
            CameraSelector::Index(index) => index,
        };

        let count = self.sdk.camera_count();
        if count == 0 {
            return Err(CameraError::NoCameras);
        }
        if index >= count {
            debug!(%selector, count, "invalid camera id");
            return Err(CameraError::DeviceNotFound { index, count });
        }

        let info = self
            .sdk
            .camera_property(index)
            .map_err(CameraError::PropertyQueryFailed)?;
        let id = info.camera_id;

        self.sdk.open(id).map_err(CameraError::OpenFailed)?;
        if let Err(status) = self.sdk.init(id) {
            self.close_quietly(id);
            return Err(CameraError::InitFailed(status));
        }

        let mut session = match DeviceSession::new(&info, self.binning) {
            Ok(session) => session,
            Err(err) => {
                self.close_quietly(id);
                return Err(err);
            }
        };
        debug!(
            camera = id,
            is_color = info.is_color,
            bins = ?info.supported_bins,
            "camera properties"
        );

        if let Err(err) = session.discover_controls(&mut self.sdk) {
            self.close_quietly(id);
            return Err(err);
        }

        let frame = Rect::from_size(session.geometry.full_size());
        let size = frame.size();
        debug!(camera = id, "frame (0,0)+({},{})", size.width, size.height);
        if let Err(status) = self.sdk.set_roi_format(
            id,
            size.width,
            size.height,
            session.geometry.binning(),
            ImageType::Raw8,
        ) {
            warn!(camera = id, %status, "set ROI format failed");
        }
        if let Err(status) = self.sdk.set_start_pos(id, 0, 0) {
            warn!(camera = id, %status, "set start position failed");
        }
        session.active_frame = frame;

        info!(camera = id, name = %session.name, "connected");
        let summary = session.info();
        self.session = Some(session);
        Ok(summary)
    }

    /// Stop streaming, close the camera and release its buffers.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop_streaming(&mut self.sdk);
            self.close_quietly(session.camera_id);
            info!(camera = session.camera_id, "disconnected");
        }
    }

    /// Leave continuous capture mode.
    pub fn stop_capture(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop_streaming(&mut self.sdk);
        }
    }

    /// Take one exposure of `duration_ms` into `image`.
    ///
    /// `subframe` selects a region of the binned frame; an empty rectangle
    /// means full frame. On success the image is full size, with everything
    /// outside a sub-frame set to [`crate::image::BACKGROUND`].
    ///
    /// Cancellation returns [`CameraError::CaptureCancelled`]. Fatal errors
    /// (see [`CameraError::is_fatal`]) disconnect the camera before returning.
    pub fn capture(
        &mut self,
        duration_ms: u32,
        image: &mut GuideImage,
        options: CaptureOptions,
        subframe: Rect,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.capture_frame(duration_ms, image, options, subframe, cancel) {
            Err(err) if err.is_fatal() => {
                error!(%err, "capture failed, disconnecting camera");
                self.disconnect();
                Err(err)
            }
            Err(CameraError::CaptureCancelled) => {
                info!("capture cancelled");
                Err(CameraError::CaptureCancelled)
            }
            other => other,
        }
    }

    fn capture_frame(
        &mut self,
        duration_ms: u32,
        image: &mut GuideImage,
        options: CaptureOptions,
        subframe: Rect,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let sdk = &mut self.sdk;
        let session = self.session.as_mut().ok_or(CameraError::NotConnected)?;
        let id = session.camera_id;

        let binning_changed = session.geometry.apply_binning(self.binning);
        let full_size = session.geometry.full_size();
        if binning_changed {
            debug!(
                camera = id,
                binning = session.geometry.binning(),
                "binning changed"
            );
        }

        image.init(full_size)?;

        let region = CaptureRegion::compute(subframe, full_size, self.config.use_subframes);

        if let Err(err) = sync_control(sdk, id, ControlType::Exposure, exposure_us(duration_ms)) {
            warn!(%err, "exposure not updated");
        }
        if let Some(range) = session.gain_range {
            let gain = range.to_device(self.gain_percent);
            if let Err(err) = sync_control(sdk, id, ControlType::Gain, gain) {
                warn!(%err, pct = self.gain_percent, "gain not updated");
            }
        }

        let change = ModeChange::between(&session.active_frame, &region.frame, binning_changed);
        let frame = region.frame;
        let size = frame.size();
        if !change.is_noop() {
            debug!(
                camera = id,
                "frame ({},{})+({},{})", frame.x, frame.y, size.width, size.height
            );
        }
        if change.requires_reconfigure() {
            session.stop_streaming(sdk);
            if let Err(status) = sdk.set_roi_format(
                id,
                size.width,
                size.height,
                session.geometry.binning(),
                ImageType::Raw8,
            ) {
                warn!(camera = id, %status, "set ROI format ({},{}) failed", size.width, size.height);
            }
        }
        if change.position_changed || change.requires_reconfigure() {
            let origin = frame.origin();
            let (x, y) = (
                u32::try_from(origin.x).unwrap_or(0),
                u32::try_from(origin.y).unwrap_or(0),
            );
            if let Err(status) = sdk.set_start_pos(id, x, y) {
                warn!(camera = id, %status, "set start position ({x},{y}) failed");
            }
        }
        session.active_frame = frame;

        flush_buffered_frames(sdk, id, &mut session.transfer);
        session.start_streaming(sdk);

        let frame_pixels = region.frame_pixels();
        let buffer = session
            .transfer
            .get_mut(..frame_pixels)
            .ok_or(CameraError::Sdk {
                operation: "video data",
                status: SdkStatus::BufferTooSmall,
            })?;

        let watchdog = Watchdog::start(
            duration_ms,
            self.config.timeout(),
            self.config.watchdog_slack(),
        );
        let poll_ms = poll_interval_ms(duration_ms);

        match wait_for_frame(sdk, id, buffer, poll_ms, &watchdog, cancel) {
            AcquireOutcome::FrameReady => {}
            AcquireOutcome::Cancelled => {
                session.stop_streaming(sdk);
                return Err(CameraError::CaptureCancelled);
            }
            AcquireOutcome::TimedOut {
                elapsed,
                last_status,
            } => {
                warn!(camera = id, status = %last_status, ?elapsed, "no frame before watchdog expired");
                session.stop_streaming(sdk);
                return Err(CameraError::CaptureTimeout { elapsed });
            }
        }

        let raw = session.transfer.get(..frame_pixels).unwrap_or_default();
        if region.subframe.is_some() {
            composite_subframe(image, raw, &region);
        } else {
            composite_full(image, raw);
        }

        if options.subtract_dark {
            self.processor.subtract_dark(image);
        }
        if options.reconstruct_color
            && session.capabilities.is_color
            && session.geometry.binning() == 1
        {
            self.processor.reconstruct_color(image);
        }

        Ok(())
    }

    /// Switch the cooler on or off.
    pub fn set_cooler_enabled(&mut self, on: bool) -> Result<()> {
        self.write_control(ControlType::CoolerOn, i64::from(on))
    }

    /// Set the cooler target temperature in degrees Celsius.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_cooler_setpoint(&mut self, temperature_c: f64) -> Result<()> {
        self.write_control(ControlType::TargetTemp, temperature_c as i64)
    }

    /// Read cooler state.
    pub fn cooler_status(&self) -> Result<CoolerStatus> {
        let session = self.session.as_ref().ok_or(CameraError::NotConnected)?;
        read_cooler_status(&self.sdk, session.camera_id).inspect_err(|err| {
            debug!(camera = session.camera_id, %err, "cooler status unavailable");
        })
    }

    /// Pulse the ST4 output in `direction` for `duration`.
    ///
    /// The output is always released, also when `cancel` cuts the pulse short,
    /// in which case [`CameraError::CaptureCancelled`] is returned.
    pub fn pulse_guide(
        &mut self,
        direction: GuideDirection,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let id = self
            .session
            .as_ref()
            .ok_or(CameraError::NotConnected)?
            .camera_id;

        self.sdk
            .pulse_guide_on(id, direction)
            .map_err(|status| CameraError::Sdk {
                operation: "pulse guide on",
                status,
            })?;
        let interrupted = cancel.sleep(duration);
        let released = self.sdk.pulse_guide_off(id, direction);

        if interrupted {
            debug!(camera = id, ?direction, "pulse interrupted");
            return Err(CameraError::CaptureCancelled);
        }
        released.map_err(|status| CameraError::Sdk {
            operation: "pulse guide off",
            status,
        })
    }

    /// Release the guide output in all directions.
    pub fn clear_guide_port(&mut self) -> Result<()> {
        let id = self
            .session
            .as_ref()
            .ok_or(CameraError::NotConnected)?
            .camera_id;
        for direction in GuideDirection::ALL {
            if let Err(status) = self.sdk.pulse_guide_off(id, direction) {
                warn!(camera = id, ?direction, %status, "guide port release failed");
            }
        }
        Ok(())
    }

    fn write_control(&mut self, control: ControlType, value: i64) -> Result<()> {
        let id = self
            .session
            .as_ref()
            .ok_or(CameraError::NotConnected)?
            .camera_id;
        self.sdk
            .set_control_value(id, control, value, false)
            .map_err(|status| CameraError::ControlQueryFailed { control, status })
    }

    fn close_quietly(&mut self, id: i32) {
        if let Err(status) = self.sdk.close(id) {
            warn!(camera = id, %status, "close failed");
        }
    }
}

impl<S: CameraSdk> Drop for ZwoCamera<S> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
