//! C FFI surface for embedding hosts.
//!
//! Follows the host-driven convention used on mobile: the host implements the
//! platform callbacks and pushes broadcasts / activity results into the
//! bridge. All strings returned by `bluestate_*` functions are heap-allocated
//! JSON result envelopes and must be freed with `bluestate_free_string`.

pub mod host;
pub mod runtime;
pub mod types;

pub use types::*;
