//! C-ABI entry points.
//!
//! The host hands the bridge a vtable of platform callbacks at init and gets
//! back a handle; all later calls are handle-indexed. Broadcasts and activity
//! results flow inbound through the `push` functions, events flow outbound
//! through the registered event callback.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, warn};

use super::runtime;
use super::types::{FfiResult, InitConfig};
use crate::bridge::BridgeController;
use crate::event::EVENT_BLUETOOTH_STATE_CHANGE;
use crate::platform::{
    ActivityResult, HostPlatform, PairedDevice, PlatformBroadcast, PlatformError, PromptResult,
};
use crate::BridgeError;

/// Called with `(ctx, event_name, payload_json)` for every bridge event.
pub type EventCallback =
    extern "C" fn(ctx: *mut c_void, event_name: *const c_char, payload_json: *const c_char);

/// Called once with `(ctx, result_json)` when a deferred operation settles.
pub type CompletionCallback = extern "C" fn(ctx: *mut c_void, result_json: *const c_char);

/// Platform callbacks supplied by the embedding host.
///
/// `ctx` is passed back verbatim on every call and must stay valid for the
/// bridge's lifetime. `bonded_devices_json` returns a host-allocated JSON
/// array of `{id, name}` objects; the bridge copies it and hands the pointer
/// back to `free_host_string`. Status-returning callbacks use 0 for success.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostVtable {
    pub ctx: *mut c_void,
    pub is_supported: extern "C" fn(ctx: *mut c_void) -> bool,
    pub adapter_state: extern "C" fn(ctx: *mut c_void) -> c_int,
    pub has_admin_permission: extern "C" fn(ctx: *mut c_void) -> bool,
    pub has_foreground_context: extern "C" fn(ctx: *mut c_void) -> bool,
    pub set_powered: extern "C" fn(ctx: *mut c_void, powered: bool) -> c_int,
    pub bonded_devices_json: extern "C" fn(ctx: *mut c_void) -> *mut c_char,
    pub open_settings: extern "C" fn(ctx: *mut c_void) -> c_int,
    pub request_enable_prompt: extern "C" fn(ctx: *mut c_void, request_code: c_int) -> c_int,
    pub register_broadcasts: extern "C" fn(ctx: *mut c_void),
    pub unregister_broadcasts: extern "C" fn(ctx: *mut c_void),
    pub free_host_string: extern "C" fn(ctx: *mut c_void, ptr: *mut c_char),
}

/// [`HostPlatform`] implemented over the host's vtable.
struct VtablePlatform {
    vt: HostVtable,
}

// The vtable context crosses threads; the host contract requires its
// callbacks to be callable from any thread.
unsafe impl Send for VtablePlatform {}
unsafe impl Sync for VtablePlatform {}

impl VtablePlatform {
    fn status(&self, op: &str, rc: c_int) -> Result<(), PlatformError> {
        if rc == 0 {
            Ok(())
        } else {
            Err(PlatformError::Call(format!("{op} returned status {rc}")))
        }
    }
}

#[async_trait]
impl HostPlatform for VtablePlatform {
    fn is_supported(&self) -> bool {
        (self.vt.is_supported)(self.vt.ctx)
    }

    fn adapter_state(&self) -> i32 {
        (self.vt.adapter_state)(self.vt.ctx)
    }

    fn has_admin_permission(&self) -> bool {
        (self.vt.has_admin_permission)(self.vt.ctx)
    }

    fn has_foreground_context(&self) -> bool {
        (self.vt.has_foreground_context)(self.vt.ctx)
    }

    fn bonded_devices(&self) -> Result<Vec<PairedDevice>, PlatformError> {
        let ptr = (self.vt.bonded_devices_json)(self.vt.ctx);
        if ptr.is_null() {
            return Ok(Vec::new());
        }
        let json = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        (self.vt.free_host_string)(self.vt.ctx, ptr);
        serde_json::from_str(&json)
            .map_err(|e| PlatformError::Call(format!("bad bonded device list: {e}")))
    }

    async fn set_powered(&self, powered: bool) -> Result<(), PlatformError> {
        self.status("set_powered", (self.vt.set_powered)(self.vt.ctx, powered))
    }

    fn open_settings(&self) -> Result<(), PlatformError> {
        self.status("open_settings", (self.vt.open_settings)(self.vt.ctx))
    }

    fn request_enable_prompt(&self, request_code: i32) -> Result<(), PlatformError> {
        self.status(
            "request_enable_prompt",
            (self.vt.request_enable_prompt)(self.vt.ctx, request_code),
        )
    }

    fn register_broadcasts(&self) {
        (self.vt.register_broadcasts)(self.vt.ctx)
    }

    fn unregister_broadcasts(&self) {
        (self.vt.unregister_broadcasts)(self.vt.ctx)
    }
}

// Handle-indexed bridge registry; shutdown clears a slot without shifting
// the handles of other instances.
static BRIDGES: Lazy<Mutex<Vec<Option<Arc<BridgeController>>>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

static EVENT_NAME: Lazy<CString> =
    Lazy::new(|| CString::new(EVENT_BLUETOOTH_STATE_CHANGE).unwrap_or_default());

/// Host context pointer moved into spawned tasks.
///
/// The pointer is reached only through [`Self::as_ptr`]: a closure that read
/// the field directly would capture the raw pointer instead of this wrapper
/// and lose the `Send` bound.
struct CallbackCtx(*mut c_void);
unsafe impl Send for CallbackCtx {}

impl CallbackCtx {
    fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

fn get_bridge(handle: i64) -> Result<Arc<BridgeController>, String> {
    let bridges = BRIDGES.lock();
    bridges
        .get(usize::try_from(handle).map_err(|_| format!("invalid handle: {handle}"))?)
        .and_then(Clone::clone)
        .ok_or_else(|| format!("invalid handle: {handle}"))
}

/// Serialize a bridge result into the JSON envelope.
fn envelope<T: Serialize>(result: Result<T, BridgeError>) -> Result<String, String> {
    serde_json::to_string(&FfiResult::from(result)).map_err(|e| e.to_string())
}

/// Turn a `Result<json, message>` into a heap C string the host must free.
fn create_result_string(result: Result<String, String>) -> *mut c_char {
    let json = match result {
        Ok(json) => json,
        Err(message) => {
            let fallback: FfiResult<()> = FfiResult::error("INTERNAL_ERROR", message);
            serde_json::to_string(&fallback).unwrap_or_else(|_| {
                r#"{"ok":false,"code":"INTERNAL_ERROR","message":"serialization failed"}"#
                    .to_string()
            })
        }
    };
    match CString::new(json) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => CString::default().into_raw(),
    }
}

unsafe fn opt_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

fn parse_log_level(level: Option<&str>) -> tracing::Level {
    match level {
        Some("trace") => tracing::Level::TRACE,
        Some("debug") => tracing::Level::DEBUG,
        Some("warn") => tracing::Level::WARN,
        Some("error") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Free a string allocated by the FFI interface. Must be called for every
/// string returned by `bluestate_*` functions.
#[no_mangle]
pub extern "C" fn bluestate_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

/// Initialize a bridge over the host's platform callbacks.
///
/// `config_json` may be null for defaults. Returns a handle for later calls,
/// or -1 on error. The bridge starts active (broadcasts registered).
#[no_mangle]
pub extern "C" fn bluestate_init(vtable: HostVtable, config_json: *const c_char) -> i64 {
    let config = match unsafe { opt_str(config_json) } {
        Some(raw) => match serde_json::from_str::<InitConfig>(&raw) {
            Ok(config) => config,
            Err(e) => {
                error!(%e, "rejecting malformed init config");
                return -1;
            }
        },
        None => InitConfig::default(),
    };

    if config.enable_logging {
        let level = parse_log_level(config.log_level.as_deref());
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }

    if let Err(e) = runtime::ensure() {
        error!(%e, "runtime init failed");
        return -1;
    }

    let platform = Arc::new(VtablePlatform { vt: vtable });
    let bridge = Arc::new(BridgeController::with_config(platform, config.bridge));
    bridge.activate();

    let mut bridges = BRIDGES.lock();
    bridges.push(Some(bridge));
    (bridges.len() - 1) as i64
}

/// Tear the bridge down: unregister broadcasts and settle any pending
/// request. The handle is invalid afterwards.
#[no_mangle]
pub extern "C" fn bluestate_shutdown(handle: i64) -> bool {
    let bridge = {
        let mut bridges = BRIDGES.lock();
        match usize::try_from(handle).ok().and_then(|i| bridges.get_mut(i)) {
            Some(slot) => slot.take(),
            None => None,
        }
    };
    match bridge {
        Some(bridge) => {
            bridge.deactivate();
            true
        }
        None => false,
    }
}

/// Current adapter state as a JSON envelope, e.g. `{"ok":true,"data":"PoweredOn"}`.
#[no_mangle]
pub extern "C" fn bluestate_get_state(handle: i64) -> *mut c_char {
    create_result_string(get_bridge(handle).and_then(|b| envelope(Ok(b.get_state()))))
}

/// Bonded devices as a JSON envelope around an array of `{id, name}`.
#[no_mangle]
pub extern "C" fn bluestate_get_paired_devices(handle: i64) -> *mut c_char {
    create_result_string(get_bridge(handle).and_then(|b| envelope(b.get_paired_devices())))
}

#[no_mangle]
pub extern "C" fn bluestate_enable(handle: i64) -> *mut c_char {
    create_result_string(
        get_bridge(handle)
            .and_then(|b| runtime::block_on(async move { b.enable().await }))
            .and_then(envelope),
    )
}

#[no_mangle]
pub extern "C" fn bluestate_disable(handle: i64) -> *mut c_char {
    create_result_string(
        get_bridge(handle)
            .and_then(|b| runtime::block_on(async move { b.disable().await }))
            .and_then(envelope),
    )
}

#[no_mangle]
pub extern "C" fn bluestate_open_settings(handle: i64) -> *mut c_char {
    create_result_string(get_bridge(handle).and_then(|b| envelope(b.open_settings())))
}

/// Launch the request-enable prompt. `on_complete` fires exactly once with
/// the settled result envelope; returns false if the task could not be
/// dispatched (no callback will fire).
#[no_mangle]
pub extern "C" fn bluestate_request_to_enable(
    handle: i64,
    on_complete: CompletionCallback,
    ctx: *mut c_void,
) -> bool {
    let bridge = match get_bridge(handle) {
        Ok(bridge) => bridge,
        Err(e) => {
            warn!(%e, "request_to_enable on invalid handle");
            return false;
        }
    };
    let ctx = CallbackCtx(ctx);
    let task = runtime::spawn(async move {
        let result = bridge.request_to_enable().await;
        match envelope(result) {
            Ok(json) => {
                if let Ok(c_json) = CString::new(json) {
                    on_complete(ctx.as_ptr(), c_json.as_ptr());
                }
            }
            Err(e) => error!(%e, "failed to serialize request_to_enable result"),
        }
    });
    match task {
        Ok(_) => true,
        Err(e) => {
            error!(%e, "failed to dispatch request_to_enable");
            false
        }
    }
}

/// Register the outbound event callback. Spawns a pump that forwards every
/// bridge event as `(EVENT_BLUETOOTH_STATE_CHANGE, payload_json)`.
#[no_mangle]
pub extern "C" fn bluestate_set_event_callback(
    handle: i64,
    on_event: EventCallback,
    ctx: *mut c_void,
) -> bool {
    let bridge = match get_bridge(handle) {
        Ok(bridge) => bridge,
        Err(e) => {
            warn!(%e, "set_event_callback on invalid handle");
            return false;
        }
    };
    let ctx = CallbackCtx(ctx);
    let task = runtime::spawn(async move {
        let mut stream = BroadcastStream::new(bridge.subscribe());
        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!(%e, "event subscriber lagged");
                    continue;
                }
            };
            match serde_json::to_string(&event) {
                Ok(payload) => {
                    if let Ok(c_payload) = CString::new(payload) {
                        on_event(ctx.as_ptr(), EVENT_NAME.as_ptr(), c_payload.as_ptr());
                    }
                }
                Err(e) => error!(%e, "failed to serialize bridge event"),
            }
        }
    });
    task.is_ok()
}

/// Push a platform broadcast into the bridge (host-driven inbound path).
/// `broadcast_json` uses the tagged wire format, e.g.
/// `{"kind":"state_changed","state":12}`.
#[no_mangle]
pub extern "C" fn bluestate_push_broadcast(handle: i64, broadcast_json: *const c_char) -> *mut c_char {
    let result = get_bridge(handle).and_then(|bridge| {
        let raw = unsafe { opt_str(broadcast_json) }.ok_or("null broadcast payload")?;
        let broadcast: PlatformBroadcast =
            serde_json::from_str(&raw).map_err(|e| format!("bad broadcast payload: {e}"))?;
        bridge.deliver_broadcast(broadcast);
        envelope(Ok(()))
    });
    create_result_string(result)
}

/// Push an activity result for a previously launched prompt.
#[no_mangle]
pub extern "C" fn bluestate_push_activity_result(
    handle: i64,
    request_code: c_int,
    result_code: c_int,
) -> *mut c_char {
    let result = get_bridge(handle).and_then(|bridge| {
        bridge.deliver_activity_result(ActivityResult {
            request_code,
            result: PromptResult::from_code(result_code),
        });
        envelope(Ok(()))
    });
    create_result_string(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    struct HostState {
        state: AtomicI32,
        register_calls: AtomicUsize,
        unregister_calls: AtomicUsize,
    }

    unsafe fn host_state<'a>(ctx: *mut c_void) -> &'a HostState {
        &*(ctx as *const HostState)
    }

    extern "C" fn host_true(_ctx: *mut c_void) -> bool {
        true
    }

    extern "C" fn host_adapter_state(ctx: *mut c_void) -> c_int {
        unsafe { host_state(ctx) }.state.load(Ordering::SeqCst)
    }

    extern "C" fn host_ok(_ctx: *mut c_void) -> c_int {
        0
    }

    extern "C" fn host_set_powered(_ctx: *mut c_void, _powered: bool) -> c_int {
        0
    }

    extern "C" fn host_bonded_none(_ctx: *mut c_void) -> *mut c_char {
        std::ptr::null_mut()
    }

    extern "C" fn host_prompt(_ctx: *mut c_void, _request_code: c_int) -> c_int {
        0
    }

    extern "C" fn host_register(ctx: *mut c_void) {
        unsafe { host_state(ctx) }
            .register_calls
            .fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn host_unregister(ctx: *mut c_void) {
        unsafe { host_state(ctx) }
            .unregister_calls
            .fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn host_free(_ctx: *mut c_void, _ptr: *mut c_char) {}

    fn vtable(state: &'static HostState) -> HostVtable {
        HostVtable {
            ctx: state as *const HostState as *mut c_void,
            is_supported: host_true,
            adapter_state: host_adapter_state,
            has_admin_permission: host_true,
            has_foreground_context: host_true,
            set_powered: host_set_powered,
            bonded_devices_json: host_bonded_none,
            open_settings: host_ok,
            request_enable_prompt: host_prompt,
            register_broadcasts: host_register,
            unregister_broadcasts: host_unregister,
            free_host_string: host_free,
        }
    }

    fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let out = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        bluestate_free_string(ptr);
        out
    }

    #[test]
    fn test_callback_ctx_future_is_send() {
        fn assert_send<F: Send>(_: F) {}
        let ctx = CallbackCtx(std::ptr::null_mut());
        // Futures handed to the runtime read the context through as_ptr and
        // must stay Send.
        assert_send(async move {
            let _ = ctx.as_ptr();
        });
    }

    #[test]
    fn test_init_query_shutdown_roundtrip() {
        let state: &'static HostState = Box::leak(Box::new(HostState {
            state: AtomicI32::new(crate::state::RAW_STATE_ON),
            register_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
        }));

        let handle = bluestate_init(vtable(state), std::ptr::null());
        assert!(handle >= 0);
        assert_eq!(state.register_calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            take_string(bluestate_get_state(handle)),
            r#"{"ok":true,"data":"PoweredOn"}"#
        );
        assert_eq!(
            take_string(bluestate_get_paired_devices(handle)),
            r#"{"ok":true,"data":[]}"#
        );
        assert_eq!(
            take_string(bluestate_open_settings(handle)),
            r#"{"ok":true,"data":null}"#
        );

        // Result with no pending request is accepted and ignored.
        assert_eq!(
            take_string(bluestate_push_activity_result(handle, 795, 0)),
            r#"{"ok":true,"data":null}"#
        );

        assert!(bluestate_shutdown(handle));
        assert_eq!(state.unregister_calls.load(Ordering::SeqCst), 1);
        assert!(!bluestate_shutdown(handle));
        assert!(take_string(bluestate_get_state(handle)).contains(r#""ok":false"#));
    }

    #[test]
    fn test_malformed_init_config_is_rejected() {
        let state: &'static HostState = Box::leak(Box::new(HostState {
            state: AtomicI32::new(crate::state::RAW_STATE_ON),
            register_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
        }));
        let config = CString::new("not json").unwrap();
        assert_eq!(bluestate_init(vtable(state), config.as_ptr()), -1);
        assert_eq!(state.register_calls.load(Ordering::SeqCst), 0);
    }
}
