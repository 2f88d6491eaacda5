//! Device Session Module
//!
//! [`MyoSession`] owns a [`MyoTransport`] and drives the armband through
//! its lifecycle: connect (with a bounded readiness poll), configuration
//! commands, the IMU subscription and notification pump, synchronous
//! reads, and the ordered shutdown sequence.
//!
//! Fatality policy: resolution/connect faults are terminal for the
//! process, command faults are logged and survivable, read faults
//! propagate to the caller, decode faults are dropped per frame.

use crate::domain::models::{DeviceId, SensorFrame, SessionState};
use crate::infrastructure::bluetooth::error::{SessionError, TransportError};
use crate::infrastructure::bluetooth::protocol::{self, Command, VibrationDuration};
use crate::infrastructure::bluetooth::transport::{CharKind, MyoTransport};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Configuration for session behavior
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between connection-readiness polls
    pub ready_poll_interval: Duration,
    /// Bound on readiness polls before connect fails with a timeout
    pub ready_max_polls: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(100),
            ready_max_polls: 100,
        }
    }
}

/// A session with one armband over a [`MyoTransport`].
pub struct MyoSession<T: MyoTransport> {
    transport: Arc<T>,
    config: SessionConfig,
    state: SessionState,
    pump: Option<JoinHandle<()>>,
}

impl<T: MyoTransport + 'static> MyoSession<T> {
    pub fn new(transport: Arc<T>, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Unopened,
            pump: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device_id(&self) -> &DeviceId {
        self.transport.device_id()
    }

    /// Connect to the armband. With `wait_until_ready`, polls the
    /// connection status at the configured interval until the link
    /// reports up (bounded by `ready_max_polls`), then vibrates short to
    /// confirm the command characteristic is actually writable, not
    /// merely that the link exists.
    pub async fn connect(&mut self, wait_until_ready: bool) -> Result<(), SessionError> {
        info!("Connecting to {}...", self.transport.device_id());
        self.state = SessionState::Connecting;

        self.transport
            .connect_device()
            .await
            .map_err(|e| match e {
                // an unresolvable characteristic is a construction-class
                // fault, not a link fault
                e @ TransportError::CharacteristicMissing(_) => SessionError::Resolution(e),
                e => SessionError::Connect(e),
            })?;

        if wait_until_ready {
            let mut ready = false;
            for _ in 0..self.config.ready_max_polls {
                if self.is_connected().await {
                    ready = true;
                    break;
                }
                tokio::time::sleep(self.config.ready_poll_interval).await;
            }
            if !ready {
                return Err(SessionError::ConnectTimeout {
                    attempts: self.config.ready_max_polls,
                });
            }
        }

        match self.transport.device_name().await {
            Ok(name) => info!("Sensor {name} is ready"),
            Err(e) => warn!(error = %e, "could not read device name"),
        }
        self.vibrate(VibrationDuration::Short).await?;

        self.state = SessionState::Connected;
        Ok(())
    }

    /// Tear the link down. The session is `Disconnected` afterwards no
    /// matter what the transport reports; a transport fault is logged and
    /// handed back to the caller.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        let result = self.transport.disconnect_device().await;
        self.state = SessionState::Disconnected;

        result.map_err(|e| {
            warn!(error = %e, "disconnect failed");
            SessionError::Disconnect(e)
        })
    }

    /// Best-effort liveness check; false on any query failure.
    pub async fn is_connected(&self) -> bool {
        match self.transport.is_link_up().await {
            Ok(up) => up,
            Err(e) => {
                debug!(error = %e, "connection status query failed");
                false
            }
        }
    }

    /// Encode and write a command. A write that completes without a reply
    /// is success; the command characteristic is fire-and-forget. Any
    /// other transport fault is logged and returned as a non-fatal
    /// command error; the session stays usable.
    pub async fn send_command(&self, cmd: Command) -> Result<(), SessionError> {
        match self.transport.write_command(cmd.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(TransportError::NoReply) => {
                trace!(?cmd, "write completed without a reply");
                Ok(())
            }
            Err(e) => {
                warn!(?cmd, error = %e, "command write failed");
                Err(SessionError::Command(e))
            }
        }
    }

    pub async fn vibrate(&self, duration: VibrationDuration) -> Result<(), SessionError> {
        self.send_command(Command::Vibrate(duration)).await
    }

    pub async fn unlock(&self) -> Result<(), SessionError> {
        self.send_command(Command::Unlock).await
    }

    pub async fn lock(&self) -> Result<(), SessionError> {
        self.send_command(Command::Lock).await
    }

    pub async fn enable_imu(&self) -> Result<(), SessionError> {
        self.send_command(Command::EnableImu).await
    }

    pub async fn disable_streaming(&self) -> Result<(), SessionError> {
        self.send_command(Command::DisableStreaming).await
    }

    pub async fn set_never_sleep(&self) -> Result<(), SessionError> {
        self.send_command(Command::NeverSleep).await
    }

    pub async fn set_normal_sleep(&self) -> Result<(), SessionError> {
        self.send_command(Command::NormalSleep).await
    }

    /// Command deep sleep. The device drops the link as soon as the
    /// command lands, so a reply may never arrive; both success and
    /// failure outcomes are suppressed.
    pub async fn set_deep_sleep(&self) {
        if let Err(e) = self.transport.write_command(Command::DeepSleep.as_bytes()).await {
            debug!(error = %e, "deep sleep write reported an error; device may already be down");
        }
    }

    /// Start notification delivery on the IMU characteristic.
    pub async fn subscribe_to_imu(&mut self) -> Result<(), SessionError> {
        match self.transport.start_imu_notify().await {
            Ok(()) => {
                info!("Subscribed to IMU notifications");
                self.state = SessionState::SubscribedImu;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to subscribe to IMU notifications");
                Err(SessionError::Command(e))
            }
        }
    }

    /// Stop notification delivery on the IMU characteristic.
    pub async fn unsubscribe_from_imu(&mut self) -> Result<(), SessionError> {
        match self.transport.stop_imu_notify().await {
            Ok(()) => {
                if self.state == SessionState::SubscribedImu {
                    self.state = SessionState::Connected;
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to unsubscribe from IMU notifications");
                Err(SessionError::Command(e))
            }
        }
    }

    /// Register `handler` for decoded IMU frames. The pump decodes each
    /// notification and invokes the handler serially with this device's
    /// identity; undecodable frames are logged and dropped so a transient
    /// malformed payload cannot kill the stream.
    pub async fn attach_imu_handler(
        &mut self,
        handler: impl Fn(&DeviceId, &SensorFrame) + Send + Sync + 'static,
    ) -> Result<(), SessionError> {
        let mut notifications = self
            .transport
            .imu_notifications()
            .await
            .map_err(SessionError::Command)?;
        let device_id = self.transport.device_id().clone();

        self.pump = Some(tokio::spawn(async move {
            while let Some(payload) = notifications.next().await {
                match protocol::decode_imu_frame(&payload) {
                    Ok(frame) => handler(&device_id, &frame),
                    Err(e) => debug!(device = %device_id, error = %e, "dropping IMU frame"),
                }
            }
            debug!(device = %device_id, "IMU notification stream ended");
        }));
        Ok(())
    }

    /// Battery charge as a percentage (single-byte read).
    pub async fn battery_level(&self) -> Result<u8, SessionError> {
        let payload = self
            .transport
            .read_value(CharKind::BatteryLevel)
            .await
            .map_err(SessionError::Read)?;
        payload
            .first()
            .copied()
            .ok_or(SessionError::Read(TransportError::EmptyRead))
    }

    /// Device name property.
    pub async fn name(&self) -> Result<String, SessionError> {
        self.transport.device_name().await.map_err(SessionError::Read)
    }

    /// Polling fallback: read and decode the IMU characteristic directly
    /// instead of subscribing.
    pub async fn read_sensor_frame(&self) -> Result<SensorFrame, SessionError> {
        let payload = self
            .transport
            .read_value(CharKind::ImuData)
            .await
            .map_err(SessionError::Read)?;
        Ok(protocol::decode_imu_frame(&payload)?)
    }

    /// Ordered teardown of the streaming state: unsubscribe, then disable
    /// streaming, then a short acknowledgment vibration, then (optionally)
    /// deep sleep. A failing step never blocks the steps after it.
    /// Reversing this order risks writing to a characteristic whose
    /// notifications are still being torn down.
    pub async fn shutdown(&mut self, deep_sleep: bool) {
        let _ = self.unsubscribe_from_imu().await;
        let _ = self.disable_streaming().await;
        let _ = self.vibrate(VibrationDuration::Short).await;
        if deep_sleep {
            info!("Putting armband into deep sleep...");
            self.set_deep_sleep().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::transport::NotificationStream;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Scripted in-process transport. Records every call; failure
    /// injection per payload / per operation.
    #[derive(Default)]
    struct MockTransport {
        calls: Mutex<Vec<String>>,
        // per-call answers for is_link_up; empty queue means "up"
        link_states: Mutex<VecDeque<bool>>,
        // payloads whose write should fail with NotConnected
        failing_payloads: Mutex<Vec<Vec<u8>>>,
        all_writes_get_no_reply: bool,
        connect_fails_unknown_device: bool,
        stop_notify_fails: bool,
        read_values: Mutex<VecDeque<Vec<u8>>>,
        notifications: Mutex<Vec<Vec<u8>>>,
        device_id: DeviceId,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                device_id: DeviceId("00:11:22:33:44:55".to_string()),
                ..Self::default()
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MyoTransport for MockTransport {
        fn device_id(&self) -> &DeviceId {
            &self.device_id
        }

        async fn connect_device(&self) -> Result<(), TransportError> {
            self.record("connect");
            if self.connect_fails_unknown_device {
                return Err(TransportError::DeviceNotFound(self.device_id.0.clone()));
            }
            Ok(())
        }

        async fn disconnect_device(&self) -> Result<(), TransportError> {
            self.record("disconnect");
            Ok(())
        }

        async fn is_link_up(&self) -> Result<bool, TransportError> {
            self.record("is-link-up");
            Ok(self.link_states.lock().unwrap().pop_front().unwrap_or(true))
        }

        async fn device_name(&self) -> Result<String, TransportError> {
            Ok("Myo".to_string())
        }

        async fn write_command(&self, payload: &[u8]) -> Result<(), TransportError> {
            self.record(format!("write {}", hex(payload)));
            if self.all_writes_get_no_reply {
                return Err(TransportError::NoReply);
            }
            if self
                .failing_payloads
                .lock()
                .unwrap()
                .iter()
                .any(|p| p == payload)
            {
                return Err(TransportError::NotConnected);
            }
            Ok(())
        }

        async fn read_value(&self, kind: CharKind) -> Result<Vec<u8>, TransportError> {
            self.record(format!("read {kind:?}"));
            self.read_values
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(TransportError::NotConnected)
        }

        async fn start_imu_notify(&self) -> Result<(), TransportError> {
            self.record("start-notify");
            Ok(())
        }

        async fn stop_imu_notify(&self) -> Result<(), TransportError> {
            self.record("stop-notify");
            if self.stop_notify_fails {
                return Err(TransportError::NotConnected);
            }
            Ok(())
        }

        async fn imu_notifications(&self) -> Result<NotificationStream, TransportError> {
            let payloads = self.notifications.lock().unwrap().clone();
            Ok(Box::pin(futures::stream::iter(payloads)))
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            ready_poll_interval: Duration::from_millis(1),
            ready_max_polls: 3,
        }
    }

    fn imu_payload(values: [i16; 10]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn no_reply_write_is_success() {
        let transport = Arc::new(MockTransport {
            all_writes_get_no_reply: true,
            ..MockTransport::new()
        });
        let session = MyoSession::new(transport.clone(), test_config());

        session.send_command(Command::Unlock).await.unwrap();
        assert_eq!(transport.calls(), vec!["write 0a0102"]);
    }

    #[tokio::test]
    async fn write_failure_is_nonfatal_command_error() {
        let transport = Arc::new(MockTransport {
            failing_payloads: Mutex::new(vec![Command::Lock.as_bytes().to_vec()]),
            ..MockTransport::new()
        });
        let session = MyoSession::new(transport.clone(), test_config());

        assert!(matches!(
            session.lock().await,
            Err(SessionError::Command(_))
        ));
        // the session survives and later commands still go through
        session.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn thin_wrappers_write_their_command_bytes() {
        let transport = Arc::new(MockTransport::new());
        let session = MyoSession::new(transport.clone(), test_config());

        session.vibrate(VibrationDuration::Long).await.unwrap();
        session.unlock().await.unwrap();
        session.lock().await.unwrap();
        session.enable_imu().await.unwrap();
        session.disable_streaming().await.unwrap();
        session.set_never_sleep().await.unwrap();
        session.set_normal_sleep().await.unwrap();

        assert_eq!(
            transport.calls(),
            vec![
                "write 030103",
                "write 0a0102",
                "write 0a0100",
                "write 0103000100",
                "write 200103000000",
                "write 090101",
                "write 090100",
            ]
        );
    }

    #[tokio::test]
    async fn name_reads_the_device_property() {
        let transport = Arc::new(MockTransport::new());
        let session = MyoSession::new(transport, test_config());
        assert_eq!(session.name().await.unwrap(), "Myo");
    }

    #[tokio::test]
    async fn connect_waits_for_readiness_then_vibrates() {
        let transport = Arc::new(MockTransport {
            link_states: Mutex::new(VecDeque::from(vec![false, false, true])),
            ..MockTransport::new()
        });
        let mut session = MyoSession::new(transport.clone(), test_config());

        session.connect(true).await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        let calls = transport.calls();
        assert_eq!(
            calls,
            vec![
                "connect",
                "is-link-up",
                "is-link-up",
                "is-link-up",
                "write 030101",
            ]
        );
    }

    #[tokio::test]
    async fn connect_wait_is_bounded() {
        let transport = Arc::new(MockTransport {
            link_states: Mutex::new(VecDeque::from(vec![false; 16])),
            ..MockTransport::new()
        });
        let mut session = MyoSession::new(transport, test_config());

        assert!(matches!(
            session.connect(true).await,
            Err(SessionError::ConnectTimeout { attempts: 3 })
        ));
        assert_ne!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn unknown_device_is_a_fatal_connect_error() {
        let transport = Arc::new(MockTransport {
            connect_fails_unknown_device: true,
            ..MockTransport::new()
        });
        let mut session = MyoSession::new(transport, test_config());

        assert!(matches!(
            session.connect(false).await,
            Err(SessionError::Connect(TransportError::DeviceNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn disconnect_from_unopened_still_lands_disconnected() {
        let transport = Arc::new(MockTransport::new());
        let mut session = MyoSession::new(transport, test_config());

        assert_eq!(session.state(), SessionState::Unopened);
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_runs_every_step_in_order_despite_failures() {
        // disable-streaming write and the unsubscribe both fail; the
        // vibration and deep sleep must still be attempted, in order
        let transport = Arc::new(MockTransport {
            stop_notify_fails: true,
            failing_payloads: Mutex::new(vec![Command::DisableStreaming.as_bytes().to_vec()]),
            ..MockTransport::new()
        });
        let mut session = MyoSession::new(transport.clone(), test_config());

        session.shutdown(true).await;
        assert_eq!(
            transport.calls(),
            vec![
                "stop-notify",
                "write 200103000000",
                "write 030101",
                "write 0400",
            ]
        );
    }

    #[tokio::test]
    async fn deep_sleep_suppresses_write_failures() {
        let transport = Arc::new(MockTransport {
            failing_payloads: Mutex::new(vec![Command::DeepSleep.as_bytes().to_vec()]),
            ..MockTransport::new()
        });
        let session = MyoSession::new(transport.clone(), test_config());

        session.set_deep_sleep().await;
        assert_eq!(transport.calls(), vec!["write 0400"]);
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_track_state() {
        let transport = Arc::new(MockTransport::new());
        let mut session = MyoSession::new(transport, test_config());
        session.connect(false).await.unwrap();

        session.subscribe_to_imu().await.unwrap();
        assert_eq!(session.state(), SessionState::SubscribedImu);

        session.unsubscribe_from_imu().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn battery_level_decodes_single_byte_percentage() {
        let transport = Arc::new(MockTransport {
            read_values: Mutex::new(VecDeque::from(vec![vec![0x55]])),
            ..MockTransport::new()
        });
        let session = MyoSession::new(transport, test_config());

        assert_eq!(session.battery_level().await.unwrap(), 85);
    }

    #[tokio::test]
    async fn empty_battery_read_propagates_as_read_error() {
        let transport = Arc::new(MockTransport {
            read_values: Mutex::new(VecDeque::from(vec![vec![]])),
            ..MockTransport::new()
        });
        let session = MyoSession::new(transport, test_config());

        assert!(matches!(
            session.battery_level().await,
            Err(SessionError::Read(TransportError::EmptyRead))
        ));
    }

    #[tokio::test]
    async fn read_sensor_frame_decodes_through_the_codec() {
        let transport = Arc::new(MockTransport {
            read_values: Mutex::new(VecDeque::from(vec![imu_payload([
                1, 0, 0, 0, 100, 0, 0, 50, 0, 0,
            ])])),
            ..MockTransport::new()
        });
        let session = MyoSession::new(transport, test_config());

        let frame = session.read_sensor_frame().await.unwrap();
        assert_eq!(frame.quaternion, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(frame.acceleration, [204_800.0, 0.0, 0.0]);
        assert_eq!(frame.gyroscope, [800.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn pump_forwards_decoded_frames_and_drops_malformed_ones() {
        let transport = Arc::new(MockTransport {
            notifications: Mutex::new(vec![
                imu_payload([1, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
                vec![0xFF; 7], // wrong length, dropped
                imu_payload([0, 2, 0, 0, 0, 0, 0, 0, 0, 0]),
            ]),
            ..MockTransport::new()
        });
        let mut session = MyoSession::new(transport.clone(), test_config());

        let seen: Arc<Mutex<Vec<(DeviceId, SensorFrame)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session
            .attach_imu_handler(move |device, frame| {
                sink.lock().unwrap().push((device.clone(), frame.clone()));
            })
            .await
            .unwrap();

        session.pump.take().unwrap().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, *transport.device_id());
        assert_eq!(seen[0].1.quaternion, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(seen[1].1.quaternion, [0.0, 1.0, 0.0, 0.0]);
    }
}
