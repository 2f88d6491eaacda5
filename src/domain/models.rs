use std::fmt;

/// Bluetooth identity of a peripheral, as reported by the adapter.
///
/// Every decoded frame is handed to the IMU handler together with the
/// originating `DeviceId` so a deployment with several armbands can tell
/// streams apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded IMU notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorFrame {
    /// Orientation quaternion (w, x, y, z), unit norm
    pub quaternion: [f32; 4],
    /// Acceleration (x, y, z) in g-units
    pub acceleration: [f32; 3],
    /// Angular velocity (x, y, z) in degrees/second
    pub gyroscope: [f32; 3],
}

/// Lifecycle of a device session. Transitions are driven only by explicit
/// session calls; the transport owns link-level timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Connecting,
    Connected,
    SubscribedImu,
    Disconnected,
}
