//! Error taxonomy for the transport seam and the device session.

use crate::infrastructure::bluetooth::protocol::DecodeError;
use crate::infrastructure::bluetooth::transport::CharKind;
use thiserror::Error;

/// Faults raised by a [`MyoTransport`](super::transport::MyoTransport)
/// backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No peripheral with the requested address is known to the adapter.
    /// Terminal: the caller should abort rather than retry.
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// A required GATT characteristic is absent on the peripheral.
    /// Terminal: the session cannot operate without all three.
    #[error("characteristic not resolved: {0:?}")]
    CharacteristicMissing(CharKind),
    /// Operation requires an established link.
    #[error("not connected")]
    NotConnected,
    /// The write was delivered but no reply arrived. The command
    /// characteristic is fire-and-forget, so callers treat this as success.
    #[error("no reply received")]
    NoReply,
    /// No usable Bluetooth adapter on this host.
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("not a Bluetooth address: {0}")]
    InvalidAddress(String),
    #[error("not a characteristic UUID: {0}")]
    InvalidUuid(String),
    /// A read returned no bytes where at least one was required.
    #[error("read returned an empty value")]
    EmptyRead,
    #[error("operation timed out: {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Backend(#[from] btleplug::Error),
}

/// Faults surfaced by [`MyoSession`](super::session::MyoSession), carrying
/// the fatality policy: resolution and connect faults are fatal to the
/// process, command faults are logged and survivable, read faults are the
/// caller's decision, decode faults are isolated per frame.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device resolution failed: {0}")]
    Resolution(#[source] TransportError),
    #[error("connect failed: {0}")]
    Connect(#[source] TransportError),
    #[error("device did not become ready within {attempts} polls")]
    ConnectTimeout { attempts: u32 },
    #[error("command write failed: {0}")]
    Command(#[source] TransportError),
    #[error("read failed: {0}")]
    Read(#[source] TransportError),
    #[error("disconnect failed: {0}")]
    Disconnect(#[source] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
