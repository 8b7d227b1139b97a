//! bluestate - host-driven Bluetooth adapter state bridge
//!
//! Exposes a device's Bluetooth adapter state and bonded-device list to an
//! application layer, plus minimal control actions (enable/disable, open
//! settings, request-enable flow). The embedding host drives the platform
//! Bluetooth stack and pushes its broadcasts and activity results into the
//! bridge; the bridge owns the correlation protocol and the outbound event
//! stream.

pub mod bridge;
pub mod event;
pub mod ffi;
pub mod platform;
pub mod state;

use thiserror::Error;

pub use bridge::{BridgeConfig, BridgeController, REQUEST_ENABLE_CODE};
pub use event::{BridgeEvent, EVENT_BLUETOOTH_STATE_CHANGE};
pub use platform::{
    ActivityResult, HostPlatform, PairedDevice, PlatformBroadcast, PlatformError, PromptResult,
};
pub use state::AdapterState;

/// Failures surfaced to the application layer. All are terminal and
/// non-retriable; no operation retries internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("this device doesn't support Bluetooth")]
    NotSupported,

    #[error("you are not authorized to do this")]
    Unauthorized,

    #[error("the user canceled the action")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Stable error code crossing the application boundary.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::NotSupported => "BLUETOOTH_NOT_SUPPORTED",
            BridgeError::Unauthorized => "UNAUTHORIZED",
            BridgeError::Canceled => "CANCELED",
            BridgeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<PlatformError> for BridgeError {
    fn from(e: PlatformError) -> Self {
        BridgeError::Internal(e.to_string())
    }
}
