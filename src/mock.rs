//! Mock SDK implementation for testing without hardware.

use std::collections::HashMap;
use std::time::Duration;

use crate::traits::{
    CameraId, CameraInfo, CameraSdk, ControlCaps, ControlType, GuideDirection, ImageType,
    SdkResult, SdkStatus,
};

/// Value written to frames that were buffered before the current request.
pub const STALE_PIXEL: u8 = 0xEE;

/// How the mock answers frame polls while streaming.
///
/// A zero-wait poll only drains queued stale frames and never sees a new
/// exposure, like a drained driver buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every poll with a non-zero wait returns a frame.
    Immediate,
    /// The next `n` waiting polls fail, later ones return frames.
    AfterPolls(usize),
    /// No frame ever arrives; each poll blocks for its wait time.
    Never,
}

/// Call made to the SDK that changes readout configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiCall {
    /// `set_roi_format(width, height, bin)`.
    Format(u32, u32, u32),
    /// `set_start_pos(x, y)`.
    StartPos(u32, u32),
}

/// Scripted camera SDK with a single 1280x960 mono camera.
#[derive(Debug)]
pub struct MockSdk {
    info: CameraInfo,
    cameras: usize,
    caps: Vec<ControlCaps>,
    controls: HashMap<ControlType, i64>,
    control_failures: HashMap<ControlType, SdkStatus>,
    control_writes: HashMap<ControlType, usize>,
    open_failure: Option<SdkStatus>,
    init_failure: Option<SdkStatus>,
    opened: bool,
    closed_calls: usize,
    streaming: bool,
    roi: (u32, u32, u32),
    start_pos: (u32, u32),
    roi_calls: Vec<RoiCall>,
    start_calls: usize,
    stop_calls: usize,
    delivery: Delivery,
    stale_frames: usize,
    video_polls: usize,
    guide_events: Vec<(GuideDirection, bool)>,
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSdk {
    /// Create a mock with one closed camera.
    #[must_use]
    pub fn new() -> Self {
        let caps = vec![
            control(ControlType::Gain, 0, 510, true),
            control(ControlType::Exposure, 32, 2_000_000_000, true),
            control(ControlType::BandwidthOverload, 40, 100, true),
            control(ControlType::Temperature, -500, 1000, false),
            control(ControlType::CoolerOn, 0, 1, true),
            control(ControlType::TargetTemp, -40, 30, true),
            control(ControlType::CoolerPowerPercent, 0, 100, false),
        ];
        let controls = caps
            .iter()
            .map(|c| (c.control_type, c.default_value))
            .collect();

        Self {
            info: CameraInfo {
                name: "ZWO ASI120MM Mini".to_owned(),
                camera_id: 0,
                max_width: 1280,
                max_height: 960,
                is_color: false,
                supported_bins: vec![1, 2, 4],
                pixel_size_um: 3.75,
                has_st4_port: true,
                is_cooler_cam: true,
                bit_depth: 12,
            },
            cameras: 1,
            caps,
            controls,
            control_failures: HashMap::new(),
            control_writes: HashMap::new(),
            open_failure: None,
            init_failure: None,
            opened: false,
            closed_calls: 0,
            streaming: false,
            roi: (1280, 960, 1),
            start_pos: (0, 0),
            roi_calls: Vec::new(),
            start_calls: 0,
            stop_calls: 0,
            delivery: Delivery::Immediate,
            stale_frames: 0,
            video_polls: 0,
            guide_events: Vec::new(),
        }
    }

    /// Create a mock whose camera is already open.
    #[must_use]
    pub fn opened() -> Self {
        let mut sdk = Self::new();
        sdk.opened = true;
        sdk
    }

    /// Create a mock whose camera is open and streaming full frames.
    #[must_use]
    pub fn streaming() -> Self {
        let mut sdk = Self::opened();
        sdk.streaming = true;
        sdk
    }

    /// Expected sensor pattern at absolute binned coordinates.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn pattern(x: u32, y: u32) -> u8 {
        ((x * 7 + y * 13) % 200) as u8
    }

    /// ID of the mock camera.
    #[must_use]
    pub const fn camera_id(&self) -> CameraId {
        self.info.camera_id
    }

    /// Bytes in one frame at the current ROI.
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.roi.0 as usize * self.roi.1 as usize
    }

    /// Replace the camera description.
    pub fn set_info(&mut self, info: CameraInfo) {
        self.info = info;
    }

    /// Number of cameras reported by `camera_count`.
    pub fn set_camera_count(&mut self, count: usize) {
        self.cameras = count;
    }

    /// Make `open` fail.
    pub fn fail_open(&mut self, status: SdkStatus) {
        self.open_failure = Some(status);
    }

    /// Make `init` fail.
    pub fn fail_init(&mut self, status: SdkStatus) {
        self.init_failure = Some(status);
    }

    /// Make reads and writes of `control` fail.
    pub fn fail_control(&mut self, control: ControlType, status: SdkStatus) {
        self.control_failures.insert(control, status);
    }

    /// Toggle whether the gain control is writable.
    pub fn set_gain_writable(&mut self, writable: bool) {
        for caps in &mut self.caps {
            if caps.control_type == ControlType::Gain {
                caps.is_writable = writable;
            }
        }
    }

    /// Set a control value directly.
    pub fn set_control(&mut self, control: ControlType, value: i64) {
        self.controls.insert(control, value);
    }

    /// Current value of a control.
    #[must_use]
    pub fn control(&self, control: ControlType) -> i64 {
        self.controls.get(&control).copied().unwrap_or_default()
    }

    /// Number of writes issued for a control.
    #[must_use]
    pub fn control_writes(&self, control: ControlType) -> usize {
        self.control_writes.get(&control).copied().unwrap_or_default()
    }

    /// Change frame delivery behaviour.
    pub fn set_delivery(&mut self, delivery: Delivery) {
        self.delivery = delivery;
    }

    /// Pretend `count` frames were buffered before the next request.
    pub fn queue_stale_frames(&mut self, count: usize) {
        self.stale_frames += count;
    }

    /// Buffered frames not yet read.
    #[must_use]
    pub const fn stale_frames(&self) -> usize {
        self.stale_frames
    }

    /// Whether video capture is active.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Whether the camera is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.opened
    }

    /// Number of `close` calls.
    #[must_use]
    pub const fn close_calls(&self) -> usize {
        self.closed_calls
    }

    /// Readout configuration calls, in order.
    #[must_use]
    pub fn roi_calls(&self) -> &[RoiCall] {
        &self.roi_calls
    }

    /// Forget recorded readout configuration calls.
    pub fn clear_roi_calls(&mut self) {
        self.roi_calls.clear();
    }

    /// Number of `start_video_capture` calls.
    #[must_use]
    pub const fn start_calls(&self) -> usize {
        self.start_calls
    }

    /// Number of `stop_video_capture` calls.
    #[must_use]
    pub const fn stop_calls(&self) -> usize {
        self.stop_calls
    }

    /// Number of `video_data` calls.
    #[must_use]
    pub const fn video_polls(&self) -> usize {
        self.video_polls
    }

    /// Guide port transitions as `(direction, on)`.
    #[must_use]
    pub fn guide_events(&self) -> &[(GuideDirection, bool)] {
        &self.guide_events
    }

    fn check_control(&self, control: ControlType) -> SdkResult<()> {
        self.control_failures
            .get(&control)
            .map_or(Ok(()), |&status| Err(status))
    }

    fn fill_frame(&self, buffer: &mut [u8]) {
        let (width, height, _) = self.roi;
        let (start_x, start_y) = self.start_pos;
        for (row, line) in buffer
            .chunks_mut(width as usize)
            .take(height as usize)
            .enumerate()
        {
            #[allow(clippy::cast_possible_truncation)]
            let y = start_y + row as u32;
            for (col, pixel) in line.iter_mut().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let x = start_x + col as u32;
                *pixel = Self::pattern(x, y);
            }
        }
    }
}

fn control(control_type: ControlType, min: i64, max: i64, writable: bool) -> ControlCaps {
    ControlCaps {
        name: format!("{control_type:?}"),
        control_type,
        min_value: min,
        max_value: max,
        default_value: min.max(0).min(max),
        is_auto_supported: false,
        is_writable: writable,
    }
}

impl CameraSdk for MockSdk {
    fn camera_count(&self) -> usize {
        self.cameras
    }

    fn camera_property(&self, index: usize) -> SdkResult<CameraInfo> {
        if index >= self.cameras {
            return Err(SdkStatus::InvalidIndex);
        }
        Ok(self.info.clone())
    }

    fn open(&mut self, _id: CameraId) -> SdkResult<()> {
        if let Some(status) = self.open_failure {
            return Err(status);
        }
        self.opened = true;
        Ok(())
    }

    fn init(&mut self, _id: CameraId) -> SdkResult<()> {
        self.init_failure.map_or(Ok(()), Err)
    }

    fn close(&mut self, _id: CameraId) -> SdkResult<()> {
        self.closed_calls += 1;
        self.opened = false;
        self.streaming = false;
        Ok(())
    }

    fn num_controls(&self, _id: CameraId) -> SdkResult<usize> {
        Ok(self.caps.len())
    }

    fn control_caps(&self, _id: CameraId, index: usize) -> SdkResult<ControlCaps> {
        self.caps.get(index).cloned().ok_or(SdkStatus::InvalidIndex)
    }

    fn control_value(&self, _id: CameraId, control: ControlType) -> SdkResult<i64> {
        self.check_control(control)?;
        Ok(self.control(control))
    }

    fn set_control_value(
        &mut self,
        _id: CameraId,
        control: ControlType,
        value: i64,
        _auto: bool,
    ) -> SdkResult<()> {
        self.check_control(control)?;
        *self.control_writes.entry(control).or_default() += 1;
        self.controls.insert(control, value);
        Ok(())
    }

    fn set_roi_format(
        &mut self,
        _id: CameraId,
        width: u32,
        height: u32,
        bin: u32,
        _image_type: ImageType,
    ) -> SdkResult<()> {
        if self.streaming {
            return Err(SdkStatus::VideoModeActive);
        }
        if width * bin > self.info.max_width || height * bin > self.info.max_height {
            return Err(SdkStatus::InvalidSize);
        }
        self.roi_calls.push(RoiCall::Format(width, height, bin));
        self.roi = (width, height, bin);
        Ok(())
    }

    fn set_start_pos(&mut self, _id: CameraId, x: u32, y: u32) -> SdkResult<()> {
        self.roi_calls.push(RoiCall::StartPos(x, y));
        self.start_pos = (x, y);
        Ok(())
    }

    fn start_video_capture(&mut self, _id: CameraId) -> SdkResult<()> {
        if !self.opened {
            return Err(SdkStatus::CameraClosed);
        }
        self.start_calls += 1;
        self.streaming = true;
        Ok(())
    }

    fn stop_video_capture(&mut self, _id: CameraId) -> SdkResult<()> {
        self.stop_calls += 1;
        self.streaming = false;
        Ok(())
    }

    fn video_data(&mut self, _id: CameraId, buffer: &mut [u8], wait_ms: u32) -> SdkResult<()> {
        self.video_polls += 1;
        if !self.streaming {
            return Err(SdkStatus::InvalidSequence);
        }
        if buffer.len() < self.frame_bytes() {
            return Err(SdkStatus::BufferTooSmall);
        }

        if self.stale_frames > 0 {
            self.stale_frames -= 1;
            buffer.fill(STALE_PIXEL);
            return Ok(());
        }
        if wait_ms == 0 {
            return Err(SdkStatus::Timeout);
        }

        match self.delivery {
            Delivery::Immediate => {}
            Delivery::AfterPolls(0) => self.delivery = Delivery::Immediate,
            Delivery::AfterPolls(remaining) => {
                self.delivery = Delivery::AfterPolls(remaining - 1);
                return Err(SdkStatus::Timeout);
            }
            Delivery::Never => {
                std::thread::sleep(Duration::from_millis(u64::from(wait_ms)));
                return Err(SdkStatus::Timeout);
            }
        }

        self.fill_frame(buffer);
        Ok(())
    }

    fn pulse_guide_on(&mut self, _id: CameraId, direction: GuideDirection) -> SdkResult<()> {
        self.guide_events.push((direction, true));
        Ok(())
    }

    fn pulse_guide_off(&mut self, _id: CameraId, direction: GuideDirection) -> SdkResult<()> {
        self.guide_events.push((direction, false));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let sdk = MockSdk::new();
        assert_eq!(sdk.camera_count(), 1);
        let info = sdk.camera_property(0).expect("property should succeed");
        assert_eq!(info.max_width, 1280);
        assert_eq!(info.supported_bins, vec![1, 2, 4]);
        assert_eq!(sdk.camera_property(1), Err(SdkStatus::InvalidIndex));
    }

    #[test]
    fn test_mock_rejects_roi_while_streaming() {
        let mut sdk = MockSdk::streaming();
        let id = sdk.camera_id();
        assert_eq!(
            sdk.set_roi_format(id, 64, 64, 1, ImageType::Raw8),
            Err(SdkStatus::VideoModeActive)
        );
        sdk.stop_video_capture(id).expect("stop should succeed");
        sdk.set_roi_format(id, 64, 64, 1, ImageType::Raw8)
            .expect("set_roi_format should succeed");
        assert_eq!(sdk.frame_bytes(), 64 * 64);
    }

    #[test]
    fn test_mock_frame_pattern_follows_start_pos() {
        let mut sdk = MockSdk::opened();
        let id = sdk.camera_id();
        sdk.set_roi_format(id, 32, 32, 1, ImageType::Raw8)
            .expect("set_roi_format should succeed");
        sdk.set_start_pos(id, 64, 96).expect("set_start_pos should succeed");
        sdk.start_video_capture(id).expect("start should succeed");

        let mut buffer = vec![0u8; 32 * 32];
        sdk.video_data(id, &mut buffer, 1).expect("video_data should succeed");
        assert_eq!(buffer[0], MockSdk::pattern(64, 96));
        assert_eq!(buffer[33], MockSdk::pattern(65, 97));
    }

    #[test]
    fn test_mock_stale_frames_come_first() {
        let mut sdk = MockSdk::streaming();
        let id = sdk.camera_id();
        let mut buffer = vec![0u8; sdk.frame_bytes()];

        sdk.queue_stale_frames(1);
        sdk.video_data(id, &mut buffer, 0).expect("stale frame");
        assert_eq!(buffer[0], STALE_PIXEL);

        assert_eq!(sdk.video_data(id, &mut buffer, 0), Err(SdkStatus::Timeout));

        sdk.video_data(id, &mut buffer, 1).expect("fresh frame");
        assert_eq!(buffer[0], MockSdk::pattern(0, 0));
    }

    #[test]
    fn test_mock_video_requires_streaming() {
        let mut sdk = MockSdk::opened();
        let id = sdk.camera_id();
        let mut buffer = vec![0u8; sdk.frame_bytes()];
        assert_eq!(
            sdk.video_data(id, &mut buffer, 0),
            Err(SdkStatus::InvalidSequence)
        );
    }
}
