//! Bluetooth Module
//!
//! Provides the BLE device session for the Myo armband.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       MyoSession                        │
//! │   (state machine, commands, subscription, shutdown)     │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!            ┌──────────┴──────────┐
//!            ▼                     ▼
//!     ┌────────────┐        ┌──────────┐
//!     │ Transport  │        │ Protocol │
//!     │   seam     │        │          │
//!     │            │        │ - UUIDs  │
//!     │ - trait    │        │ - Command│
//!     │ - btleplug │        │   frames │
//!     │   backend  │        │ - decode │
//!     └────────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Command wire format and IMU frame decoding
//! - [`transport`] - The GATT capability trait the session runs against
//! - [`connection`] - `btleplug` transport backend
//! - [`session`] - Device session state machine and command surface
//! - [`error`] - Transport and session error taxonomy

pub mod connection;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export the session for convenience
pub use session::MyoSession;
