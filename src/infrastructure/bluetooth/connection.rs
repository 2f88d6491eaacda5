//! BLE Connection Module
//!
//! Production [`MyoTransport`] backend on top of `btleplug`: peripheral
//! resolution by Bluetooth address, connect/disconnect, characteristic
//! resolution, and GATT read/write/notify plumbing.

use crate::domain::models::DeviceId;
use crate::infrastructure::bluetooth::error::TransportError;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{CharKind, MyoTransport, NotificationStream};
use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hard cap on the link-level connect. BlueZ's Connect call can block
/// indefinitely when the device is out of range or the stack is wedged.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard cap on GATT service discovery.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long to wait for the peripheral to appear during resolution
    pub scan_timeout_secs: u64,
    /// Control service UUID, used as the scan filter
    pub control_service_uuid: String,
    /// Command characteristic UUID
    pub command_char_uuid: String,
    /// IMU data characteristic UUID
    pub imu_data_char_uuid: String,
    /// Battery level characteristic UUID
    pub battery_char_uuid: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 10,
            control_service_uuid: protocol::CONTROL_SERVICE_UUID.to_string(),
            command_char_uuid: protocol::COMMAND_CHAR_UUID.to_string(),
            imu_data_char_uuid: protocol::IMU_DATA_CHAR_UUID.to_string(),
            battery_char_uuid: protocol::BATTERY_LEVEL_CHAR_UUID.to_string(),
        }
    }
}

/// Characteristic UUIDs parsed once at construction.
#[derive(Debug, Clone, Copy)]
struct CharUuids {
    command: Uuid,
    imu_data: Uuid,
    battery: Uuid,
}

/// The three characteristics, resolved after service discovery.
struct ResolvedChars {
    command: Characteristic,
    imu_data: Characteristic,
    battery: Characteristic,
}

/// `btleplug`-backed transport bound to a single peripheral.
pub struct BleTransport {
    peripheral: Peripheral,
    device_id: DeviceId,
    uuids: CharUuids,
    // None until connect_device has resolved all three characteristics
    chars: Mutex<Option<ResolvedChars>>,
}

impl BleTransport {
    /// Resolve the peripheral with the given Bluetooth address on the
    /// first adapter. Fails with [`TransportError::DeviceNotFound`] if the
    /// device does not show up within the configured scan window.
    pub async fn open(address: &str, config: ConnectionConfig) -> Result<Self, TransportError> {
        let target: BDAddr = address
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;

        let control_service = parse_uuid(&config.control_service_uuid)?;
        let uuids = CharUuids {
            command: parse_uuid(&config.command_char_uuid)?,
            imu_data: parse_uuid(&config.imu_data_char_uuid)?,
            battery: parse_uuid(&config.battery_char_uuid)?,
        };

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;

        info!("Resolving device {target}...");
        let filter = ScanFilter {
            services: vec![control_service],
        };
        adapter.start_scan(filter).await?;
        let found = find_peripheral(&adapter, target, config.scan_timeout_secs).await;
        adapter.stop_scan().await.ok();

        let peripheral = found.ok_or_else(|| TransportError::DeviceNotFound(address.to_string()))?;
        info!("Found peripheral {target}");

        Ok(Self {
            peripheral,
            device_id: DeviceId(target.to_string()),
            uuids,
            chars: Mutex::new(None),
        })
    }

    fn char_for(&self, kind: CharKind) -> Result<Characteristic, TransportError> {
        let chars = self.chars.lock().unwrap();
        let resolved = chars.as_ref().ok_or(TransportError::NotConnected)?;
        Ok(match kind {
            CharKind::Command => resolved.command.clone(),
            CharKind::ImuData => resolved.imu_data.clone(),
            CharKind::BatteryLevel => resolved.battery.clone(),
        })
    }

    /// Resolve all three characteristics from the discovered services.
    /// All-or-nothing: a missing characteristic leaves the cache empty.
    fn resolve_characteristics(&self) -> Result<(), TransportError> {
        let available = self.peripheral.characteristics();
        let find = |uuid: Uuid, kind: CharKind| {
            available
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(TransportError::CharacteristicMissing(kind))
        };

        let resolved = ResolvedChars {
            command: find(self.uuids.command, CharKind::Command)?,
            imu_data: find(self.uuids.imu_data, CharKind::ImuData)?,
            battery: find(self.uuids.battery, CharKind::BatteryLevel)?,
        };
        debug!("Resolved command, IMU data and battery characteristics");

        *self.chars.lock().unwrap() = Some(resolved);
        Ok(())
    }
}

#[async_trait]
impl MyoTransport for BleTransport {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    async fn connect_device(&self) -> Result<(), TransportError> {
        tokio::time::timeout(CONNECT_TIMEOUT, self.peripheral.connect())
            .await
            .map_err(|_| TransportError::Timeout("connect"))??;

        // On Linux the stack signals connection completion before the GATT
        // cache is populated; discovering too early yields an empty set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(DISCOVERY_TIMEOUT, self.peripheral.discover_services())
            .await
            .map_err(|_| TransportError::Timeout("service discovery"))??;

        self.resolve_characteristics()
    }

    async fn disconnect_device(&self) -> Result<(), TransportError> {
        *self.chars.lock().unwrap() = None;
        self.peripheral.disconnect().await?;
        info!("Disconnected: {}", self.device_id);
        Ok(())
    }

    async fn is_link_up(&self) -> Result<bool, TransportError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn device_name(&self) -> Result<String, TransportError> {
        let props = self.peripheral.properties().await?;
        Ok(props
            .and_then(|p| p.local_name)
            .unwrap_or_else(|| self.device_id.0.clone()))
    }

    async fn write_command(&self, payload: &[u8]) -> Result<(), TransportError> {
        let command_char = self.char_for(CharKind::Command)?;
        self.peripheral
            .write(&command_char, payload, WriteType::WithResponse)
            .await
            .map_err(|e| {
                // BlueZ surfaces a delivered-but-unacknowledged write as a
                // reply timeout; the command characteristic never needs one.
                if e.to_string().contains("Did not receive a reply") {
                    TransportError::NoReply
                } else {
                    TransportError::Backend(e)
                }
            })
    }

    async fn read_value(&self, kind: CharKind) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.char_for(kind)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn start_imu_notify(&self) -> Result<(), TransportError> {
        let imu_char = self.char_for(CharKind::ImuData)?;
        Ok(self.peripheral.subscribe(&imu_char).await?)
    }

    async fn stop_imu_notify(&self) -> Result<(), TransportError> {
        let imu_char = self.char_for(CharKind::ImuData)?;
        Ok(self.peripheral.unsubscribe(&imu_char).await?)
    }

    async fn imu_notifications(&self) -> Result<NotificationStream, TransportError> {
        let imu_uuid = self.char_for(CharKind::ImuData)?.uuid;
        let notifications = self.peripheral.notifications().await?;
        Ok(Box::pin(notifications.filter_map(move |n| async move {
            (n.uuid == imu_uuid).then_some(n.value)
        })))
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, TransportError> {
    Uuid::parse_str(raw).map_err(|_| TransportError::InvalidUuid(raw.to_string()))
}

/// Poll the adapter until the target address appears or the window expires.
async fn find_peripheral(adapter: &Adapter, target: BDAddr, timeout_secs: u64) -> Option<Peripheral> {
    let result = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        loop {
            for p in adapter.peripherals().await.unwrap_or_default() {
                if p.address() == target {
                    return p;
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await;

    if result.is_err() {
        warn!("Device {target} not seen within {timeout_secs} s");
    }
    result.ok()
}
