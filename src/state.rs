//! Adapter state codes and their application-layer names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw platform code for an adapter that is powered off.
pub const RAW_STATE_OFF: i32 = 10;
/// Raw platform code for an adapter that is switching on.
pub const RAW_STATE_TURNING_ON: i32 = 11;
/// Raw platform code for an adapter that is powered on.
pub const RAW_STATE_ON: i32 = 12;
/// Raw platform code for an adapter that is switching off.
pub const RAW_STATE_TURNING_OFF: i32 = 13;

/// Adapter state as surfaced to the application layer.
///
/// The serialized variant names are part of the wire contract and must not
/// change. Exactly one value holds at any instant; the value is owned by the
/// platform and only observed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    /// Map a raw platform state code to an [`AdapterState`].
    ///
    /// Pure function: both transitional codes collapse to `Resetting`, and
    /// anything outside the known range maps to `Unknown`. `Unsupported` is
    /// only produced by the bridge for adapters that do not exist, and
    /// `Unauthorized` only by hosts with permission-restricted adapters;
    /// neither comes out of this mapping.
    pub fn from_raw(code: i32) -> Self {
        match code {
            RAW_STATE_OFF => AdapterState::PoweredOff,
            RAW_STATE_ON => AdapterState::PoweredOn,
            RAW_STATE_TURNING_ON | RAW_STATE_TURNING_OFF => AdapterState::Resetting,
            _ => AdapterState::Unknown,
        }
    }

    /// Wire name of the state, identical to its serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterState::Unknown => "Unknown",
            AdapterState::Resetting => "Resetting",
            AdapterState::Unsupported => "Unsupported",
            AdapterState::Unauthorized => "Unauthorized",
            AdapterState::PoweredOff => "PoweredOff",
            AdapterState::PoweredOn => "PoweredOn",
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
