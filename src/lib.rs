//! ASI-Guide-Capture: a ZWO ASI guide camera driver for autoguiding
//!
//! This library drives ZWO ASI cameras in continuous video mode as a
//! single-exposure guide camera. Sub-frame readout, stale-frame flushing and
//! bounded, cancellable acquisition sit behind a trait-based SDK abstraction,
//! so the capture state machine runs against real hardware and against a
//! scripted mock alike.

pub mod acquisition;
pub mod camera;
pub mod config;
pub mod controls;
pub mod device;
pub mod geometry;
pub mod image;
pub mod logger;
pub mod session;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use acquisition::CancellationToken;
pub use camera::{CameraEntry, CameraSelector, CaptureOptions, ZwoCamera};
pub use config::{CameraConfig, CaptureConfig, Config};
pub use controls::{CoolerStatus, GainRange};
pub use device::AsiSdk;
pub use geometry::{DeviceGeometry, Rect, Size};
pub use image::{FrameProcessor, GuideImage, NoProcessing};
pub use session::{Capabilities, SessionInfo};
pub use traits::{CameraError, CameraSdk, GuideDirection, SdkStatus};
