//! State of one connected camera.

use tracing::{debug, warn};

use crate::controls::GainRange;
use crate::geometry::{DeviceGeometry, Rect, Size};
use crate::traits::{CameraError, CameraId, CameraInfo, CameraSdk, ControlType, Result};

/// Features discovered while connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Gain can be set.
    pub has_gain_control: bool,
    /// Cooler can be switched.
    pub has_cooler: bool,
    /// ST4 guide output is present.
    pub has_guide_output: bool,
    /// Sensor has a Bayer matrix.
    pub is_color: bool,
}

/// Summary returned from a successful connect.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Camera model name.
    pub name: String,
    /// Sensor geometry at the active binning.
    pub geometry: DeviceGeometry,
    /// Gain limits, when gain is writable.
    pub gain_range: Option<GainRange>,
    /// Discovered features.
    pub capabilities: Capabilities,
}

/// Device state owned by the orchestrator while connected.
///
/// Dropping the session releases the transfer buffer.
#[derive(Debug)]
pub(crate) struct DeviceSession {
    pub camera_id: CameraId,
    pub name: String,
    pub geometry: DeviceGeometry,
    pub gain_range: Option<GainRange>,
    pub capabilities: Capabilities,
    pub streaming: bool,
    pub active_frame: Rect,
    pub transfer: Vec<u8>,
}

impl DeviceSession {
    /// Build a session for an opened camera and allocate its transfer buffer.
    pub fn new(info: &CameraInfo, requested_binning: u32) -> Result<Self> {
        let geometry = DeviceGeometry::new(
            Size::new(info.max_width, info.max_height),
            info.pixel_size_um,
            &info.supported_bins,
            requested_binning,
        );

        let bytes = geometry.max_size().area();
        let mut transfer = Vec::new();
        transfer
            .try_reserve_exact(bytes)
            .map_err(|_| CameraError::MemoryAllocationFailed { bytes })?;
        transfer.resize(bytes, 0);

        Ok(Self {
            camera_id: info.camera_id,
            name: info.name.clone(),
            active_frame: Rect::from_size(geometry.full_size()),
            geometry,
            gain_range: None,
            capabilities: Capabilities {
                has_guide_output: info.has_st4_port,
                is_color: info.is_color,
                ..Capabilities::default()
            },
            streaming: false,
            transfer,
        })
    }

    /// Walk the control list and record gain and cooler support.
    ///
    /// Controls whose capabilities cannot be read are skipped. USB bandwidth
    /// is dropped to its minimum on the way.
    pub fn discover_controls<S: CameraSdk>(&mut self, sdk: &mut S) -> Result<()> {
        let id = self.camera_id;
        let count = sdk
            .num_controls(id)
            .map_err(CameraError::PropertyQueryFailed)?;

        self.capabilities.has_gain_control = false;
        self.capabilities.has_cooler = false;

        for index in 0..count {
            let caps = match sdk.control_caps(id, index) {
                Ok(caps) => caps,
                Err(status) => {
                    debug!(camera = id, index, %status, "skipping unreadable control");
                    continue;
                }
            };

            match caps.control_type {
                ControlType::Gain if caps.is_writable => {
                    self.capabilities.has_gain_control = true;
                    self.gain_range = Some(GainRange {
                        min: caps.min_value,
                        max: caps.max_value,
                    });
                }
                ControlType::BandwidthOverload => {
                    if let Err(status) = sdk.set_control_value(
                        id,
                        ControlType::BandwidthOverload,
                        caps.min_value,
                        false,
                    ) {
                        warn!(camera = id, %status, "failed to set USB bandwidth");
                    }
                }
                ControlType::CoolerOn if caps.is_writable => {
                    debug!(camera = id, "camera has cooler");
                    self.capabilities.has_cooler = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Public view of the session.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            name: self.name.clone(),
            geometry: self.geometry.clone(),
            gain_range: self.gain_range,
            capabilities: self.capabilities,
        }
    }

    /// Enter continuous capture if not already streaming.
    pub fn start_streaming<S: CameraSdk>(&mut self, sdk: &mut S) {
        if self.streaming {
            return;
        }
        debug!(camera = self.camera_id, "startcapture");
        if let Err(status) = sdk.start_video_capture(self.camera_id) {
            warn!(camera = self.camera_id, %status, "start video capture failed");
        }
        self.streaming = true;
    }

    /// Leave continuous capture if streaming.
    pub fn stop_streaming<S: CameraSdk>(&mut self, sdk: &mut S) {
        if !self.streaming {
            return;
        }
        debug!(camera = self.camera_id, "stopcapture");
        if let Err(status) = sdk.stop_video_capture(self.camera_id) {
            warn!(camera = self.camera_id, %status, "stop video capture failed");
        }
        self.streaming = false;
    }
}
