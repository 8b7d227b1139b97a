//! Structured events published to the application layer.
//!
//! Every platform broadcast the bridge forwards is converted into a
//! [`BridgeEvent`] and published on a single named channel. Payloads are
//! serde-serialized records, never hand-built strings.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::state::AdapterState;

/// Name of the single event channel the application layer subscribes to.
pub const EVENT_BLUETOOTH_STATE_CHANGE: &str = "EVENT_BLUETOOTH_STATE_CHANGE";

/// Payloads delivered on [`EVENT_BLUETOOTH_STATE_CHANGE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeEvent {
    /// Adapter state transition.
    StateChange { state: AdapterState },
    /// A device connected to or disconnected from the adapter.
    ///
    /// `name` is absent when the platform cannot provide a device name; the
    /// event is still emitted.
    DeviceConnection {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(rename = "isConnected")]
        is_connected: bool,
    },
}

/// Bounded fan-out channel for bridge events.
///
/// Events are published in emission order, no batching. Emitting with no live
/// subscribers is not an error; a lagging subscriber drops its own oldest
/// events without affecting others.
pub struct EventChannel {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        // broadcast::channel rejects a zero capacity.
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BridgeEvent) {
        trace!(?event, "emitting bridge event");
        // Send only fails when every receiver is gone; nothing to do then.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_change_payload_shape() {
        let event = BridgeEvent::StateChange {
            state: AdapterState::PoweredOn,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"state":"PoweredOn"}"#);
    }

    #[test]
    fn test_device_payload_includes_name_when_known() {
        let event = BridgeEvent::DeviceConnection {
            id: "AA:BB:CC:DD:EE:FF".to_string(),
            name: Some("Headset".to_string()),
            is_connected: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"id":"AA:BB:CC:DD:EE:FF","name":"Headset","isConnected":true}"#
        );
    }

    #[test]
    fn test_device_payload_omits_missing_name() {
        let event = BridgeEvent::DeviceConnection {
            id: "AA:BB:CC:DD:EE:FF".to_string(),
            name: None,
            is_connected: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("name"));
        assert_eq!(json, r#"{"id":"AA:BB:CC:DD:EE:FF","isConnected":false}"#);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let channel = EventChannel::new(4);
        channel.emit(BridgeEvent::StateChange {
            state: AdapterState::PoweredOff,
        });
    }

    #[test]
    fn test_events_arrive_in_emission_order() {
        let channel = EventChannel::new(8);
        let mut rx = channel.subscribe();

        channel.emit(BridgeEvent::StateChange {
            state: AdapterState::Resetting,
        });
        channel.emit(BridgeEvent::StateChange {
            state: AdapterState::PoweredOn,
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::StateChange {
                state: AdapterState::Resetting
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeEvent::StateChange {
                state: AdapterState::PoweredOn
            }
        );
    }
}
