//! Gain mapping, exposure/gain synchronisation and cooler readout.

use tracing::debug;

use crate::traits::{CameraError, CameraId, CameraSdk, ControlType, Result};

/// Map a 0-100 guide gain percentage onto the device range.
#[must_use]
pub const fn cam_gain(min: i64, max: i64, pct: u32) -> i64 {
    min + pct as i64 * (max - min) / 100
}

/// Map a device gain value back to a 0-100 percentage.
#[must_use]
pub const fn gain_pct(min: i64, max: i64, value: i64) -> i64 {
    if max == min {
        return 0;
    }
    (value - min) * 100 / (max - min)
}

/// Device gain limits, fixed once the camera is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainRange {
    /// Minimum device gain.
    pub min: i64,
    /// Maximum device gain.
    pub max: i64,
}

impl GainRange {
    /// Device gain for a percentage; values above 100 are clamped.
    #[must_use]
    pub fn to_device(self, pct: u32) -> i64 {
        cam_gain(self.min, self.max, pct.min(100))
    }
}

/// Exposure control value for a duration in milliseconds.
#[must_use]
pub const fn exposure_us(duration_ms: u32) -> i64 {
    duration_ms as i64 * 1000
}

/// Set `control` to `target` unless it already holds that value.
///
/// Returns whether a write was issued. A failed read skips the write, leaving
/// the device with whatever value it already holds.
pub fn sync_control<S: CameraSdk>(
    sdk: &mut S,
    id: CameraId,
    control: ControlType,
    target: i64,
) -> Result<bool> {
    let current = sdk
        .control_value(id, control)
        .map_err(|status| CameraError::ControlQueryFailed { control, status })?;

    if current == target {
        return Ok(false);
    }

    debug!(?control, current, target, "set control");
    sdk.set_control_value(id, control, target, false)
        .map_err(|status| CameraError::ControlQueryFailed { control, status })?;
    Ok(true)
}

/// Cooler state read back from the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolerStatus {
    /// Whether the cooler is running.
    pub on: bool,
    /// Target temperature in degrees Celsius.
    pub setpoint_c: f64,
    /// Cooler power in percent.
    pub power_pct: f64,
    /// Sensor temperature in degrees Celsius.
    pub temperature_c: f64,
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn read_cooler_status<S: CameraSdk>(sdk: &S, id: CameraId) -> Result<CoolerStatus> {
    let read = |control| {
        sdk.control_value(id, control)
            .map_err(|status| CameraError::ControlQueryFailed { control, status })
    };

    let on = read(ControlType::CoolerOn)? != 0;
    let setpoint_c = read(ControlType::TargetTemp)? as f64;
    let temperature_c = read(ControlType::Temperature)? as f64 / 10.0;
    let power_pct = read(ControlType::CoolerPowerPercent)? as f64;

    Ok(CoolerStatus {
        on,
        setpoint_c,
        power_pct,
        temperature_c,
    })
}
