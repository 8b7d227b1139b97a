//! FFI data types and JSON schemas.
//!
//! Everything crossing the FFI boundary is JSON. Results travel in a uniform
//! envelope so hosts can check `ok` before reading `data`.

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeConfig;
use crate::BridgeError;

/// Result envelope for every FFI call that returns data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FfiResult<T> {
    Ok { ok: bool, data: T },
    Err { ok: bool, code: String, message: String },
}

impl<T> FfiResult<T> {
    pub fn success(data: T) -> Self {
        FfiResult::Ok { ok: true, data }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        FfiResult::Err {
            ok: false,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl<T> From<Result<T, BridgeError>> for FfiResult<T> {
    fn from(result: Result<T, BridgeError>) -> Self {
        match result {
            Ok(data) => FfiResult::success(data),
            Err(e) => FfiResult::error(e.code(), e.to_string()),
        }
    }
}

/// Host-supplied initialization config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    pub enable_logging: bool,
    pub log_level: Option<String>,
    #[serde(flatten)]
    pub bridge: BridgeConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let json = serde_json::to_string(&FfiResult::success("PoweredOn")).unwrap();
        assert_eq!(json, r#"{"ok":true,"data":"PoweredOn"}"#);
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope: FfiResult<()> = Err(BridgeError::Unauthorized).into();
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(
            json,
            r#"{"ok":false,"code":"UNAUTHORIZED","message":"you are not authorized to do this"}"#
        );
    }

    #[test]
    fn test_init_config_defaults() {
        let config: InitConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.enable_logging);
        assert_eq!(config.bridge.request_enable_code, crate::REQUEST_ENABLE_CODE);
    }

    #[test]
    fn test_init_config_overrides() {
        let config: InitConfig = serde_json::from_str(
            r#"{"enable_logging":true,"log_level":"debug","request_enable_code":42,"event_capacity":8}"#,
        )
        .unwrap();
        assert!(config.enable_logging);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.bridge.request_enable_code, 42);
        assert_eq!(config.bridge.event_capacity, 8);
    }
}
