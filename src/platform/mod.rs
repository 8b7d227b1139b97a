//! Host platform seam.
//!
//! The embedding host implements [`HostPlatform`] and pushes its asynchronous
//! callbacks through the controller's `deliver_*` entry points. This keeps the
//! correlation logic free of platform callback types: the host drives the
//! platform Bluetooth stack, Rust owns the protocol state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw activity result code for an approved prompt.
pub const RESULT_CODE_APPROVED: i32 = -1;
/// Raw activity result code for a canceled prompt.
pub const RESULT_CODE_CANCELED: i32 = 0;

/// Snapshot of a bonded device.
///
/// Read fresh from the platform on every query; never cached by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Platform broadcasts the host forwards into the bridge while it is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformBroadcast {
    /// The adapter changed state; carries the raw platform state code.
    StateChanged { state: i32 },
    /// A device established an ACL connection. `name` may be unavailable.
    AclConnected {
        address: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// A device dropped its ACL connection.
    AclDisconnected {
        address: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Outcome of the platform's "request enable" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResult {
    Approved,
    Canceled,
    /// Any result code the protocol does not define.
    Other(i32),
}

impl PromptResult {
    pub fn from_code(code: i32) -> Self {
        match code {
            RESULT_CODE_APPROVED => PromptResult::Approved,
            RESULT_CODE_CANCELED => PromptResult::Canceled,
            other => PromptResult::Other(other),
        }
    }
}

/// An activity result the host delivers for a previously launched prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityResult {
    /// Correlation code the prompt was launched with.
    pub request_code: i32,
    pub result: PromptResult,
}

/// Host-side failure while executing a platform call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("platform call failed: {0}")]
    Call(String),

    #[error("operation not supported on this platform")]
    Unsupported,
}

/// Platform operations the embedding host provides.
///
/// Queries are synchronous snapshots of platform state. `set_powered` may
/// suspend while the host talks to the adapter. Broadcast registration is
/// lifecycle-managed by the bridge and must be treated as a toggle: the bridge
/// never registers twice without unregistering in between.
#[async_trait]
pub trait HostPlatform: Send + Sync {
    /// Whether the device has a Bluetooth adapter at all.
    fn is_supported(&self) -> bool;

    /// Raw platform state code of the default adapter.
    fn adapter_state(&self) -> i32;

    /// Whether the caller holds the adapter-control permission.
    fn has_admin_permission(&self) -> bool;

    /// Whether an active foreground context exists to launch UI from.
    fn has_foreground_context(&self) -> bool;

    /// Bonded devices known to the adapter. An empty list is a valid answer.
    fn bonded_devices(&self) -> Result<Vec<PairedDevice>, PlatformError>;

    /// Power the adapter on or off.
    async fn set_powered(&self, powered: bool) -> Result<(), PlatformError>;

    /// Open the platform's Bluetooth settings screen.
    fn open_settings(&self) -> Result<(), PlatformError>;

    /// Launch the "ask the user to enable Bluetooth" prompt. The outcome
    /// arrives later as an [`ActivityResult`] carrying the same request code.
    fn request_enable_prompt(&self, request_code: i32) -> Result<(), PlatformError>;

    /// Start forwarding adapter and device broadcasts to the bridge.
    fn register_broadcasts(&self);

    /// Stop forwarding broadcasts.
    fn unregister_broadcasts(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_result_from_code() {
        assert_eq!(PromptResult::from_code(-1), PromptResult::Approved);
        assert_eq!(PromptResult::from_code(0), PromptResult::Canceled);
        assert_eq!(PromptResult::from_code(7), PromptResult::Other(7));
    }

    #[test]
    fn test_broadcast_wire_format() {
        let json = r#"{"kind":"state_changed","state":12}"#;
        let parsed: PlatformBroadcast = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, PlatformBroadcast::StateChanged { state: 12 });

        let json = r#"{"kind":"acl_connected","address":"AA:BB:CC:DD:EE:FF","name":null}"#;
        let parsed: PlatformBroadcast = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            PlatformBroadcast::AclConnected {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                name: None,
            }
        );
    }

    #[test]
    fn test_paired_device_serialization() {
        let device = PairedDevice {
            id: "11:22:33:44:55:66".to_string(),
            name: None,
        };
        assert_eq!(
            serde_json::to_string(&device).unwrap(),
            r#"{"id":"11:22:33:44:55:66"}"#
        );
    }
}
