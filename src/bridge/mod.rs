//! Bridge controller.
//!
//! Translates imperative application calls into platform operations (one
//! settled result per call), re-emits platform broadcasts as structured
//! events, and correlates the single outstanding request-enable prompt with
//! its eventual platform-delivered outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::event::{BridgeEvent, EventChannel};
use crate::platform::{
    ActivityResult, HostPlatform, PairedDevice, PlatformBroadcast, PromptResult,
};
use crate::state::AdapterState;
use crate::BridgeError;

/// Correlation code used when launching the request-enable prompt.
pub const REQUEST_ENABLE_CODE: i32 = 795;

/// Bridge tuning knobs, deserialized from the host's init config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Correlation code for the request-enable prompt.
    pub request_enable_code: i32,
    /// Capacity of the outbound event channel.
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_enable_code: REQUEST_ENABLE_CODE,
            event_capacity: 64,
        }
    }
}

/// The single in-flight request-enable operation.
///
/// The oneshot sender is consumed on settlement, so a request can never be
/// resolved twice. At most one instance lives in the controller's slot.
struct PendingEnable {
    request_code: i32,
    /// Which `request_to_enable` call installed this entry; cleanup paths
    /// for call N must not touch an entry installed by call N+1.
    generation: u64,
    tx: oneshot::Sender<Result<(), BridgeError>>,
}

/// Bridge between the host platform's Bluetooth stack and the application
/// layer. Safe to share across threads; host callbacks may arrive on any
/// thread via [`deliver_broadcast`](Self::deliver_broadcast) and
/// [`deliver_activity_result`](Self::deliver_activity_result).
pub struct BridgeController {
    platform: Arc<dyn HostPlatform>,
    events: EventChannel,
    /// Guarded single-slot register; removes the lost-update race between a
    /// new request and an in-flight result delivery.
    pending_enable: Mutex<Option<PendingEnable>>,
    enable_generation: AtomicU64,
    registered: AtomicBool,
    config: BridgeConfig,
}

impl BridgeController {
    pub fn new(platform: Arc<dyn HostPlatform>) -> Self {
        Self::with_config(platform, BridgeConfig::default())
    }

    pub fn with_config(platform: Arc<dyn HostPlatform>, config: BridgeConfig) -> Self {
        Self {
            platform,
            events: EventChannel::new(config.event_capacity),
            pending_enable: Mutex::new(None),
            enable_generation: AtomicU64::new(0),
            registered: AtomicBool::new(false),
            config,
        }
    }

    // --- lifecycle -----------------------------------------------------------

    /// Register for platform broadcasts. Idempotent; a no-op on devices
    /// without Bluetooth.
    pub fn activate(&self) {
        if !self.platform.is_supported() {
            debug!("bluetooth unsupported, skipping broadcast registration");
            return;
        }
        if self.registered.swap(true, Ordering::SeqCst) {
            return;
        }
        self.platform.register_broadcasts();
        info!("listening for bluetooth broadcasts");
    }

    /// Unregister broadcasts and settle any pending enable request with
    /// `CANCELED`, so no caller is ever left waiting past teardown.
    /// Idempotent.
    pub fn deactivate(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            self.platform.unregister_broadcasts();
            info!("stopped listening for bluetooth broadcasts");
        }
        if let Some(pending) = self.pending_enable.lock().take() {
            warn!("deactivated with an enable request still pending");
            let _ = pending.tx.send(Err(BridgeError::Canceled));
        }
    }

    pub fn is_active(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Subscribe to the outbound event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    // --- queries -------------------------------------------------------------

    /// Current adapter state. Never fails: devices without Bluetooth report
    /// [`AdapterState::Unsupported`].
    pub fn get_state(&self) -> AdapterState {
        if !self.platform.is_supported() {
            return AdapterState::Unsupported;
        }
        AdapterState::from_raw(self.platform.adapter_state())
    }

    /// Fresh snapshot of the platform's bonded devices. The empty set is a
    /// valid, settled result.
    pub fn get_paired_devices(&self) -> Result<Vec<PairedDevice>, BridgeError> {
        self.ensure_supported()?;
        let devices = self.platform.bonded_devices()?;
        debug!(count = devices.len(), "read bonded devices");
        Ok(devices)
    }

    /// Power the adapter on.
    pub async fn enable(&self) -> Result<(), BridgeError> {
        self.set_powered(true).await
    }

    /// Power the adapter off.
    pub async fn disable(&self) -> Result<(), BridgeError> {
        self.set_powered(false).await
    }

    async fn set_powered(&self, powered: bool) -> Result<(), BridgeError> {
        self.ensure_supported()?;
        self.ensure_foreground()?;
        // Permission is checked before touching the adapter; an unauthorized
        // caller must cause no platform side effect.
        if !self.platform.has_admin_permission() {
            return Err(BridgeError::Unauthorized);
        }
        self.platform.set_powered(powered).await?;
        info!(powered, "adapter power changed");
        Ok(())
    }

    /// Launch the platform's Bluetooth settings screen.
    pub fn open_settings(&self) -> Result<(), BridgeError> {
        self.ensure_supported()?;
        self.ensure_foreground()?;
        self.platform.open_settings()?;
        Ok(())
    }

    // --- request-to-enable flow ---------------------------------------------

    /// Ask the user to enable Bluetooth and suspend until the platform
    /// delivers the prompt's outcome.
    ///
    /// At most one request is in flight: a call while another is pending
    /// fails fast with `INTERNAL_ERROR` and dispatches no second prompt.
    /// A user decline settles with [`BridgeError::Canceled`].
    pub async fn request_to_enable(&self) -> Result<(), BridgeError> {
        self.ensure_foreground()?;

        let request_code = self.config.request_enable_code;
        let generation = self.enable_generation.fetch_add(1, Ordering::Relaxed);
        let rx = {
            let mut slot = self.pending_enable.lock();
            if slot.is_some() {
                return Err(BridgeError::Internal(
                    "an enable request is already pending".to_string(),
                ));
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(PendingEnable {
                request_code,
                generation,
                tx,
            });
            rx
        };

        if let Err(e) = self.platform.request_enable_prompt(request_code) {
            // Only clear our own entry: a result may already have consumed it
            // and a fresh request claimed the slot in the meantime.
            let mut slot = self.pending_enable.lock();
            if slot.as_ref().map_or(false, |p| p.generation == generation) {
                *slot = None;
            }
            drop(slot);
            return Err(BridgeError::Internal(format!(
                "failed to launch enable prompt: {e}"
            )));
        }
        debug!(request_code, "enable prompt dispatched");

        // A dropped sender still settles the caller, so every dispatched
        // request resolves exactly once.
        rx.await.unwrap_or_else(|_| {
            Err(BridgeError::Internal(
                "enable request dropped without a result".to_string(),
            ))
        })
    }

    // --- host-driven inbound -------------------------------------------------

    /// Entry point for platform broadcasts, called by the host from its
    /// callback thread. Dropped while the bridge is inactive.
    pub fn deliver_broadcast(&self, broadcast: PlatformBroadcast) {
        if !self.is_active() {
            debug!(?broadcast, "broadcast while inactive, dropping");
            return;
        }
        let event = match broadcast {
            PlatformBroadcast::StateChanged { state } => BridgeEvent::StateChange {
                state: AdapterState::from_raw(state),
            },
            PlatformBroadcast::AclConnected { address, name } => BridgeEvent::DeviceConnection {
                id: address,
                name,
                is_connected: true,
            },
            PlatformBroadcast::AclDisconnected { address, name } => {
                BridgeEvent::DeviceConnection {
                    id: address,
                    name,
                    is_connected: false,
                }
            }
        };
        self.events.emit(event);
    }

    /// Entry point for activity results, called by the host when a launched
    /// prompt completes. Results with a foreign request code are ignored; a
    /// result with no pending request is logged and ignored.
    pub fn deliver_activity_result(&self, result: ActivityResult) {
        let pending = {
            let mut slot = self.pending_enable.lock();
            match slot.as_ref() {
                Some(p) if p.request_code == result.request_code => slot.take(),
                Some(_) => {
                    debug!(
                        request_code = result.request_code,
                        "activity result for a foreign request code, ignoring"
                    );
                    return;
                }
                None => {
                    warn!(
                        request_code = result.request_code,
                        "activity result with no pending enable request"
                    );
                    return;
                }
            }
        };
        let Some(pending) = pending else {
            return;
        };

        let outcome = match result.result {
            PromptResult::Approved => Ok(()),
            PromptResult::Canceled => Err(BridgeError::Canceled),
            PromptResult::Other(code) => {
                warn!(code, "unhandled enable prompt result code");
                Err(BridgeError::Internal(format!(
                    "unhandled enable prompt result code {code}"
                )))
            }
        };
        // The caller may have given up; settling is best-effort by then.
        let _ = pending.tx.send(outcome);
    }

    // --- helpers -------------------------------------------------------------

    fn ensure_supported(&self) -> Result<(), BridgeError> {
        if self.platform.is_supported() {
            Ok(())
        } else {
            Err(BridgeError::NotSupported)
        }
    }

    fn ensure_foreground(&self) -> Result<(), BridgeError> {
        if self.platform.has_foreground_context() {
            Ok(())
        } else {
            Err(BridgeError::Internal(
                "there is no active foreground context".to_string(),
            ))
        }
    }
}
