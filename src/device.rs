//! ZWO ASI SDK backend loaded from `libASICamera2` at runtime.
//!
//! The vendor library is opened with `libloading` and every entry point used by
//! [`CameraSdk`] is resolved up front, so a partially installed SDK is reported
//! by [`AsiSdk::load`] rather than on first use.

#![allow(unsafe_code)]

use std::ffi::{c_char, c_int, c_long};
use std::path::Path;

use libloading::Library;
use tracing::{debug, info};

use crate::traits::{
    CameraError, CameraId, CameraInfo, CameraSdk, ControlCaps, ControlType, GuideDirection,
    ImageType, Result, SdkResult, SdkStatus,
};

type AsiBool = c_int;
const ASI_FALSE: AsiBool = 0;
const ASI_TRUE: AsiBool = 1;

/// `ASI_CAMERA_INFO` from `ASICamera2.h`.
#[repr(C)]
#[allow(dead_code)] // layout must match the header even where fields go unread
struct AsiCameraInfo {
    name: [c_char; 64],
    camera_id: c_int,
    // height precedes width in the SDK header
    max_height: c_long,
    max_width: c_long,
    is_color_cam: AsiBool,
    bayer_pattern: c_int,
    supported_bins: [c_int; 16],
    supported_video_format: [c_int; 8],
    pixel_size: f64,
    mechanical_shutter: AsiBool,
    st4_port: AsiBool,
    is_cooler_cam: AsiBool,
    is_usb3_host: AsiBool,
    is_usb3_camera: AsiBool,
    elec_per_adu: f32,
    bit_depth: c_int,
    is_trigger_cam: AsiBool,
    unused: [c_char; 16],
}

/// `ASI_CONTROL_CAPS` from `ASICamera2.h`.
#[repr(C)]
#[allow(dead_code)]
struct AsiControlCaps {
    name: [c_char; 64],
    description: [c_char; 128],
    max_value: c_long,
    min_value: c_long,
    default_value: c_long,
    is_auto_supported: AsiBool,
    is_writable: AsiBool,
    control_type: c_int,
    unused: [c_char; 32],
}

const LIBRARY_NAMES: &[&str] = if cfg!(target_os = "windows") {
    &["ASICamera2.dll"]
} else if cfg!(target_os = "macos") {
    &[
        "libASICamera2.dylib",
        "/usr/local/lib/libASICamera2.dylib",
        "/opt/homebrew/lib/libASICamera2.dylib",
    ]
} else {
    &[
        "libASICamera2.so",
        "libASICamera2.so.1",
        "/usr/lib/libASICamera2.so",
        "/usr/local/lib/libASICamera2.so",
    ]
};

/// Vendor SDK with resolved entry points.
pub struct AsiSdk {
    get_num_of_connected_cameras: unsafe extern "C" fn() -> c_int,
    get_camera_property: unsafe extern "C" fn(*mut AsiCameraInfo, c_int) -> c_int,
    open_camera: unsafe extern "C" fn(c_int) -> c_int,
    init_camera: unsafe extern "C" fn(c_int) -> c_int,
    close_camera: unsafe extern "C" fn(c_int) -> c_int,
    get_num_of_controls: unsafe extern "C" fn(c_int, *mut c_int) -> c_int,
    get_control_caps: unsafe extern "C" fn(c_int, c_int, *mut AsiControlCaps) -> c_int,
    get_control_value: unsafe extern "C" fn(c_int, c_int, *mut c_long, *mut AsiBool) -> c_int,
    set_control_value: unsafe extern "C" fn(c_int, c_int, c_long, AsiBool) -> c_int,
    set_roi_format: unsafe extern "C" fn(c_int, c_int, c_int, c_int, c_int) -> c_int,
    set_start_pos: unsafe extern "C" fn(c_int, c_int, c_int) -> c_int,
    start_video_capture: unsafe extern "C" fn(c_int) -> c_int,
    stop_video_capture: unsafe extern "C" fn(c_int) -> c_int,
    get_video_data: unsafe extern "C" fn(c_int, *mut u8, c_long, c_int) -> c_int,
    pulse_guide_on: unsafe extern "C" fn(c_int, c_int) -> c_int,
    pulse_guide_off: unsafe extern "C" fn(c_int, c_int) -> c_int,
    // Keeps the function pointers above valid.
    _lib: Library,
}

impl std::fmt::Debug for AsiSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsiSdk").finish_non_exhaustive()
    }
}

impl AsiSdk {
    /// Load the SDK from the platform's usual library locations.
    pub fn load() -> Result<Self> {
        let mut last_error = String::from("no library candidates");
        for name in LIBRARY_NAMES {
            match Self::load_from(Path::new(name)) {
                Ok(sdk) => return Ok(sdk),
                Err(err) => {
                    debug!(library = *name, %err, "SDK candidate rejected");
                    last_error = err.to_string();
                }
            }
        }
        Err(CameraError::SdkUnavailable(last_error))
    }

    /// Load the SDK from an explicit library path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let unavailable = |err: libloading::Error| {
            CameraError::SdkUnavailable(format!("{}: {err}", path.display()))
        };

        // SAFETY: libASICamera2 has no load-time initialisers with
        // preconditions, and each symbol is typed per ASICamera2.h.
        unsafe {
            let lib = Library::new(path).map_err(unavailable)?;
            let sdk = Self {
                get_num_of_connected_cameras: *lib
                    .get(b"ASIGetNumOfConnectedCameras\0")
                    .map_err(unavailable)?,
                get_camera_property: *lib.get(b"ASIGetCameraProperty\0").map_err(unavailable)?,
                open_camera: *lib.get(b"ASIOpenCamera\0").map_err(unavailable)?,
                init_camera: *lib.get(b"ASIInitCamera\0").map_err(unavailable)?,
                close_camera: *lib.get(b"ASICloseCamera\0").map_err(unavailable)?,
                get_num_of_controls: *lib.get(b"ASIGetNumOfControls\0").map_err(unavailable)?,
                get_control_caps: *lib.get(b"ASIGetControlCaps\0").map_err(unavailable)?,
                get_control_value: *lib.get(b"ASIGetControlValue\0").map_err(unavailable)?,
                set_control_value: *lib.get(b"ASISetControlValue\0").map_err(unavailable)?,
                set_roi_format: *lib.get(b"ASISetROIFormat\0").map_err(unavailable)?,
                set_start_pos: *lib.get(b"ASISetStartPos\0").map_err(unavailable)?,
                start_video_capture: *lib.get(b"ASIStartVideoCapture\0").map_err(unavailable)?,
                stop_video_capture: *lib.get(b"ASIStopVideoCapture\0").map_err(unavailable)?,
                get_video_data: *lib.get(b"ASIGetVideoData\0").map_err(unavailable)?,
                pulse_guide_on: *lib.get(b"ASIPulseGuideOn\0").map_err(unavailable)?,
                pulse_guide_off: *lib.get(b"ASIPulseGuideOff\0").map_err(unavailable)?,
                _lib: lib,
            };
            info!(library = %path.display(), "loaded ZWO ASI SDK");
            Ok(sdk)
        }
    }
}

fn c_string(raw: &[c_char]) -> String {
    #[allow(clippy::cast_sign_loss)]
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn to_c_int(value: u32) -> SdkResult<c_int> {
    c_int::try_from(value).map_err(|_| SdkStatus::OutOfBoundary)
}

fn dimension(value: c_long) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

impl From<AsiCameraInfo> for CameraInfo {
    fn from(raw: AsiCameraInfo) -> Self {
        Self {
            name: c_string(&raw.name),
            camera_id: raw.camera_id,
            max_width: dimension(raw.max_width),
            max_height: dimension(raw.max_height),
            is_color: raw.is_color_cam != ASI_FALSE,
            supported_bins: raw
                .supported_bins
                .iter()
                .take_while(|&&bin| bin != 0)
                .filter_map(|&bin| u32::try_from(bin).ok())
                .collect(),
            pixel_size_um: raw.pixel_size,
            has_st4_port: raw.st4_port != ASI_FALSE,
            is_cooler_cam: raw.is_cooler_cam != ASI_FALSE,
            bit_depth: u32::try_from(raw.bit_depth).unwrap_or(0),
        }
    }
}

impl From<AsiControlCaps> for ControlCaps {
    fn from(raw: AsiControlCaps) -> Self {
        Self {
            name: c_string(&raw.name),
            control_type: ControlType::from_raw(raw.control_type),
            min_value: i64::from(raw.min_value),
            max_value: i64::from(raw.max_value),
            default_value: i64::from(raw.default_value),
            is_auto_supported: raw.is_auto_supported != ASI_FALSE,
            is_writable: raw.is_writable != ASI_FALSE,
        }
    }
}

impl CameraSdk for AsiSdk {
    fn camera_count(&self) -> usize {
        // SAFETY: takes no arguments.
        let count = unsafe { (self.get_num_of_connected_cameras)() };
        usize::try_from(count).unwrap_or(0)
    }

    fn camera_property(&self, index: usize) -> SdkResult<CameraInfo> {
        let index = c_int::try_from(index).map_err(|_| SdkStatus::InvalidIndex)?;
        let mut raw = std::mem::MaybeUninit::<AsiCameraInfo>::zeroed();
        // SAFETY: `raw` is a properly sized, writable ASI_CAMERA_INFO.
        SdkStatus::check(unsafe { (self.get_camera_property)(raw.as_mut_ptr(), index) })?;
        // SAFETY: zero is a valid bit pattern for every field and the SDK
        // filled the struct on success.
        Ok(unsafe { raw.assume_init() }.into())
    }

    fn open(&mut self, id: CameraId) -> SdkResult<()> {
        // SAFETY: plain integer argument.
        SdkStatus::check(unsafe { (self.open_camera)(id) })
    }

    fn init(&mut self, id: CameraId) -> SdkResult<()> {
        // SAFETY: plain integer argument.
        SdkStatus::check(unsafe { (self.init_camera)(id) })
    }

    fn close(&mut self, id: CameraId) -> SdkResult<()> {
        // SAFETY: plain integer argument.
        SdkStatus::check(unsafe { (self.close_camera)(id) })
    }

    fn num_controls(&self, id: CameraId) -> SdkResult<usize> {
        let mut count: c_int = 0;
        // SAFETY: `count` outlives the call.
        SdkStatus::check(unsafe { (self.get_num_of_controls)(id, &mut count) })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn control_caps(&self, id: CameraId, index: usize) -> SdkResult<ControlCaps> {
        let index = c_int::try_from(index).map_err(|_| SdkStatus::InvalidIndex)?;
        let mut raw = std::mem::MaybeUninit::<AsiControlCaps>::zeroed();
        // SAFETY: `raw` is a properly sized, writable ASI_CONTROL_CAPS.
        SdkStatus::check(unsafe { (self.get_control_caps)(id, index, raw.as_mut_ptr()) })?;
        // SAFETY: zero-initialised and filled by the SDK on success.
        Ok(unsafe { raw.assume_init() }.into())
    }

    fn control_value(&self, id: CameraId, control: ControlType) -> SdkResult<i64> {
        let mut value: c_long = 0;
        let mut auto: AsiBool = ASI_FALSE;
        // SAFETY: both out-pointers outlive the call.
        SdkStatus::check(unsafe {
            (self.get_control_value)(id, control.raw(), &mut value, &mut auto)
        })?;
        Ok(i64::from(value))
    }

    fn set_control_value(
        &mut self,
        id: CameraId,
        control: ControlType,
        value: i64,
        auto: bool,
    ) -> SdkResult<()> {
        let value = c_long::try_from(value).map_err(|_| SdkStatus::OutOfBoundary)?;
        let auto = if auto { ASI_TRUE } else { ASI_FALSE };
        // SAFETY: plain value arguments.
        SdkStatus::check(unsafe { (self.set_control_value)(id, control.raw(), value, auto) })
    }

    fn set_roi_format(
        &mut self,
        id: CameraId,
        width: u32,
        height: u32,
        bin: u32,
        image_type: ImageType,
    ) -> SdkResult<()> {
        let (width, height, bin) = (to_c_int(width)?, to_c_int(height)?, to_c_int(bin)?);
        // SAFETY: plain value arguments.
        SdkStatus::check(unsafe {
            (self.set_roi_format)(id, width, height, bin, image_type.raw())
        })
    }

    fn set_start_pos(&mut self, id: CameraId, x: u32, y: u32) -> SdkResult<()> {
        let (x, y) = (to_c_int(x)?, to_c_int(y)?);
        // SAFETY: plain value arguments.
        SdkStatus::check(unsafe { (self.set_start_pos)(id, x, y) })
    }

    fn start_video_capture(&mut self, id: CameraId) -> SdkResult<()> {
        // SAFETY: plain integer argument.
        SdkStatus::check(unsafe { (self.start_video_capture)(id) })
    }

    fn stop_video_capture(&mut self, id: CameraId) -> SdkResult<()> {
        // SAFETY: plain integer argument.
        SdkStatus::check(unsafe { (self.stop_video_capture)(id) })
    }

    fn video_data(&mut self, id: CameraId, buffer: &mut [u8], wait_ms: u32) -> SdkResult<()> {
        let len = c_long::try_from(buffer.len()).map_err(|_| SdkStatus::BufferTooSmall)?;
        let wait = c_int::try_from(wait_ms).unwrap_or(c_int::MAX);
        // SAFETY: the SDK writes at most `len` bytes into `buffer`.
        SdkStatus::check(unsafe { (self.get_video_data)(id, buffer.as_mut_ptr(), len, wait) })
    }

    fn pulse_guide_on(&mut self, id: CameraId, direction: GuideDirection) -> SdkResult<()> {
        // SAFETY: plain value arguments.
        SdkStatus::check(unsafe { (self.pulse_guide_on)(id, direction.raw()) })
    }

    fn pulse_guide_off(&mut self, id: CameraId, direction: GuideDirection) -> SdkResult<()> {
        // SAFETY: plain value arguments.
        SdkStatus::check(unsafe { (self.pulse_guide_off)(id, direction.raw()) })
    }
}
