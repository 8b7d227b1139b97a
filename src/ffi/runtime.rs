//! Global async runtime for the FFI boundary.
//!
//! Hosts call in from their own threads; every suspending bridge operation is
//! driven on one lazily-created Tokio runtime shared by all bridge instances.

use std::future::Future;

use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Get the global runtime, creating it on first use.
pub fn ensure() -> Result<&'static Runtime, String> {
    RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            // Lightweight pool; the bridge is I/O-bound on host callbacks.
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| format!("failed to create runtime: {e}"))
    })
}

/// Drive a future to completion on the global runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output, String> {
    Ok(ensure()?.block_on(future))
}

/// Spawn a task on the global runtime.
pub fn spawn<F>(future: F) -> Result<JoinHandle<F::Output>, String>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Ok(ensure()?.spawn(future))
}
