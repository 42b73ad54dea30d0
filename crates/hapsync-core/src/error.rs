//! Error types for the hapsync system
//!
//! This module defines all error types used throughout the crate. The variants
//! follow the sync core's failure taxonomy: soft conditions (`Unreachable`),
//! per-update failures (`Transport`, `MalformedPayload`), caller errors
//! (`DeviceNotFound`, `PluginNotFound`) and idempotent no-ops (`AlreadyExists`).

use thiserror::Error;

/// Result type alias for hapsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of payload characters kept in a `MalformedPayload` error
const PAYLOAD_EXCERPT_LEN: usize = 200;

/// Core error type for the hapsync system
#[derive(Error, Debug)]
pub enum Error {
    /// Device is currently unreachable (powered off, offline)
    ///
    /// This is a soft condition: retry on the next tick, do not alarm.
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    /// Network or HTTP failure talking to a vendor backend
    #[error("Transport error: {0}")]
    Transport(String),

    /// A payload did not contain the fields required to build a state record
    #[error("Malformed payload: {message} (payload: {excerpt})")]
    MalformedPayload {
        /// What was missing or wrong
        message: String,
        /// Leading part of the offending payload
        excerpt: String,
    },

    /// No adapter is registered for a brand
    #[error("Plugin not found for brand: {0}")]
    PluginNotFound(String),

    /// No device is registered under an id
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A device with this id is already registered
    #[error("Device already exists: {0}")]
    AlreadyExists(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A command could not be encoded for the target device
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A plugin does not know how to model a device type
    #[error("Unsupported device type: {0}")]
    UnsupportedDevice(String),

    /// A subscriber reported a failure while handling a notification
    #[error("Listener error: {0}")]
    Listener(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A plugin failed (e.g. a contained panic)
    #[error("Plugin error ({brand}): {message}")]
    Plugin {
        /// Brand of the failing plugin
        brand: String,
        /// What went wrong
        message: String,
    },
}

impl Error {
    /// Create an unreachable error
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a malformed payload error, keeping a bounded excerpt of the payload
    pub fn malformed(msg: impl Into<String>, payload: &serde_json::Value) -> Self {
        let rendered = payload.to_string();
        let excerpt = match rendered.char_indices().nth(PAYLOAD_EXCERPT_LEN) {
            Some((idx, _)) => format!("{}...", &rendered[..idx]),
            None => rendered,
        };

        Self::MalformedPayload {
            message: msg.into(),
            excerpt,
        }
    }

    /// Create a "plugin not found" error
    pub fn plugin_not_found(brand: impl Into<String>) -> Self {
        Self::PluginNotFound(brand.into())
    }

    /// Create a "device not found" error
    pub fn device_not_found(id: impl Into<String>) -> Self {
        Self::DeviceNotFound(id.into())
    }

    /// Create an "already exists" error
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists(id.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create an invalid command error
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Create an unsupported device error
    pub fn unsupported_device(device_type: impl Into<String>) -> Self {
        Self::UnsupportedDevice(device_type.into())
    }

    /// Create a listener error
    pub fn listener(msg: impl Into<String>) -> Self {
        Self::Listener(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a plugin error
    pub fn plugin(brand: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            brand: brand.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a soft, retry-next-tick condition
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_keeps_short_payload_intact() {
        let payload = serde_json::json!({"runState": {}});
        let err = Error::malformed("missing runState.currentState", &payload);

        match err {
            Error::MalformedPayload { excerpt, .. } => assert_eq!(excerpt, payload.to_string()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_truncates_long_payload() {
        let payload = serde_json::Value::String("x".repeat(1_000));
        let err = Error::malformed("not an object", &payload);

        match err {
            Error::MalformedPayload { excerpt, .. } => {
                assert!(excerpt.ends_with("..."));
                assert_eq!(excerpt.chars().count(), PAYLOAD_EXCERPT_LEN + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn only_unreachable_is_soft() {
        assert!(Error::unreachable("powered off").is_soft());
        assert!(!Error::transport("timeout").is_soft());
        assert!(!Error::device_not_found("x").is_soft());
        assert!(!Error::already_exists("x").is_soft());
    }

    #[test]
    fn already_exists_names_the_device() {
        assert_eq!(
            Error::already_exists("w1").to_string(),
            "Device already exists: w1"
        );
    }
}
