//! Myo Armband Protocol
//!
//! This module contains the protocol definitions for communicating with
//! the Myo armband: the command wire format written to the command
//! characteristic and the decoder for raw IMU notification frames.
//!
//! Byte values follow the vendor protocol header (`myohw.h`).

use crate::domain::models::SensorFrame;
use thiserror::Error;

/// Myo control service UUID.
pub const CONTROL_SERVICE_UUID: &str = "d5060001-a904-deb9-4748-2c7f4a124842";

/// Command characteristic UUID - where configuration commands are written.
pub const COMMAND_CHAR_UUID: &str = "d5060401-a904-deb9-4748-2c7f4a124842";

/// IMU data characteristic UUID - notifies 20-byte sensor frames.
pub const IMU_DATA_CHAR_UUID: &str = "d5060402-a904-deb9-4748-2c7f4a124842";

/// Battery level characteristic UUID (standard Battery Service).
pub const BATTERY_LEVEL_CHAR_UUID: &str = "00002a19-0000-1000-8000-00805f9b34fb";

/// Length of a raw IMU notification payload: ten little-endian i16 values.
pub const IMU_FRAME_LEN: usize = 20;

/// Vibration pulse length for the vibrate command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibrationDuration {
    Short,
    Medium,
    Long,
}

/// Armband configuration and control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Pulse the vibration motor
    Vibrate(VibrationDuration),
    /// Stream IMU data; EMG and the pose classifier stay off
    EnableImu,
    /// Turn IMU, EMG and classifier streaming off
    DisableStreaming,
    /// Unlock the armband
    Unlock,
    /// Re-lock the armband
    Lock,
    /// Keep the armband awake while connected
    NeverSleep,
    /// Restore the default sleep-when-idle behavior
    NormalSleep,
    /// Power down until the device is physically woken; drops the link
    DeepSleep,
}

impl Command {
    /// Get the raw bytes for this command.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Vibrate(VibrationDuration::Short) => &[0x03, 0x01, 0x01],
            Self::Vibrate(VibrationDuration::Medium) => &[0x03, 0x01, 0x02],
            Self::Vibrate(VibrationDuration::Long) => &[0x03, 0x01, 0x03],
            Self::EnableImu => &[0x01, 0x03, 0x00, 0x01, 0x00],
            Self::DisableStreaming => &[0x20, 0x01, 0x03, 0x00, 0x00, 0x00],
            Self::Unlock => &[0x0A, 0x01, 0x02],
            Self::Lock => &[0x0A, 0x01, 0x00],
            Self::NeverSleep => &[0x09, 0x01, 0x01],
            Self::NormalSleep => &[0x09, 0x01, 0x00],
            Self::DeepSleep => &[0x04, 0x00],
        }
    }
}

/// IMU scaling factors from the vendor header.
pub mod imu_scale {
    /// Orientation quaternion scale, applied before normalization
    pub const ORIENTATION: f32 = 16384.0;
    /// Accelerometer scale (g-units)
    pub const ACCELEROMETER: f32 = 2048.0;
    /// Gyroscope scale (degrees/second)
    pub const GYROSCOPE: f32 = 16.0;
}

/// A notification payload that could not be decoded into a [`SensorFrame`].
///
/// Decode failures are per-frame: the pump logs them and drops the frame
/// rather than killing a long-running stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected IMU payload length: {0} (expected {IMU_FRAME_LEN})")]
    UnexpectedLength(usize),
    #[error("all-zero orientation quaternion cannot be normalized")]
    ZeroNormQuaternion,
}

/// Decode a raw IMU notification into a [`SensorFrame`].
///
/// The payload is ten little-endian signed 16-bit integers:
///
/// ```text
/// [0-7]   : orientation quaternion w, x, y, z
/// [8-13]  : accelerometer x, y, z
/// [14-19] : gyroscope x, y, z
/// ```
///
/// Quaternion components are scaled by [`imu_scale::ORIENTATION`] and then
/// normalized to unit length; accelerometer and gyroscope components are
/// scaled by their respective factors. The scale application direction
/// mirrors the device's reference client.
pub fn decode_imu_frame(payload: &[u8]) -> Result<SensorFrame, DecodeError> {
    if payload.len() != IMU_FRAME_LEN {
        return Err(DecodeError::UnexpectedLength(payload.len()));
    }

    let mut values = [0i16; 10];
    for (value, chunk) in values.iter_mut().zip(payload.chunks_exact(2)) {
        *value = i16::from_le_bytes([chunk[0], chunk[1]]);
    }

    let mut quaternion = [0f32; 4];
    for (q, &raw) in quaternion.iter_mut().zip(&values[..4]) {
        *q = raw as f32 * imu_scale::ORIENTATION;
    }

    let norm = quaternion.iter().map(|q| q * q).sum::<f32>().sqrt();
    if norm == 0.0 {
        return Err(DecodeError::ZeroNormQuaternion);
    }
    for q in &mut quaternion {
        *q /= norm;
    }

    let mut acceleration = [0f32; 3];
    for (a, &raw) in acceleration.iter_mut().zip(&values[4..7]) {
        *a = raw as f32 * imu_scale::ACCELEROMETER;
    }

    let mut gyroscope = [0f32; 3];
    for (g, &raw) in gyroscope.iter_mut().zip(&values[7..10]) {
        *g = raw as f32 * imu_scale::GYROSCOPE;
    }

    Ok(SensorFrame {
        quaternion,
        acceleration,
        gyroscope,
    })
}
