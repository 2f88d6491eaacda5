//! Transport capability seam.
//!
//! The session depends on four GATT capabilities: characteristic
//! read/write, notification start/stop, device connect/disconnect, and a
//! property query for connection status and device name. [`MyoTransport`]
//! captures exactly those, so the session logic runs unchanged against the
//! production BLE backend or an in-process test double, and makes no
//! assumption about which concurrency model delivers notifications beyond
//! per-device serialization.

use crate::domain::models::DeviceId;
use crate::infrastructure::bluetooth::error::TransportError;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// The three characteristics a session operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharKind {
    Command,
    ImuData,
    BatteryLevel,
}

/// Raw notification payloads from the IMU data characteristic.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

#[async_trait]
pub trait MyoTransport: Send + Sync {
    /// Identity of the peripheral this transport is bound to.
    fn device_id(&self) -> &DeviceId;

    /// Establish the link. [`TransportError::DeviceNotFound`] and
    /// [`TransportError::CharacteristicMissing`] are terminal.
    async fn connect_device(&self) -> Result<(), TransportError>;

    /// Tear the link down.
    async fn disconnect_device(&self) -> Result<(), TransportError>;

    /// Query the link-level connection status.
    async fn is_link_up(&self) -> Result<bool, TransportError>;

    /// Read the device name property.
    async fn device_name(&self) -> Result<String, TransportError>;

    /// Write a command frame to the command characteristic.
    async fn write_command(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Read the current value of a characteristic.
    async fn read_value(&self, kind: CharKind) -> Result<Vec<u8>, TransportError>;

    /// Start notification delivery on the IMU data characteristic.
    async fn start_imu_notify(&self) -> Result<(), TransportError>;

    /// Stop notification delivery on the IMU data characteristic.
    async fn stop_imu_notify(&self) -> Result<(), TransportError>;

    /// Stream of raw IMU notification payloads. Delivery is serialized
    /// per device; the stream ends when the link drops.
    async fn imu_notifications(&self) -> Result<NotificationStream, TransportError>;
}
