use std::path::PathBuf;

use crate::permission::PermissionOutcome;

/// Failures of the subscription lifecycle.
///
/// The first four variants are the named failure points of an attempt; the
/// rest are commands the controller refuses without starting one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("notification permission {0}")]
    Permission(PermissionOutcome),

    #[error("push platform rejected the request: {0}")]
    Platform(String),

    #[error("subscription registry request failed: {0}")]
    Registry(String),

    #[error("a subscription change is already in progress")]
    AttemptInFlight,

    #[error("push notifications are not supported on this platform")]
    Unsupported,

    #[error("subscription state has not been resolved yet")]
    NotInitialized,
}

impl PushError {
    /// Short stable tag used in `Error(reason)` states and telemetry.
    pub fn tag(&self) -> &'static str {
        match self {
            PushError::Decode(_) => "decode-error",
            PushError::Permission(PermissionOutcome::Denied) => "permission-denied",
            PushError::Permission(PermissionOutcome::Dismissed) => "permission-dismissed",
            PushError::Permission(PermissionOutcome::Granted) => "permission-granted",
            PushError::Platform(_) => "platform-error",
            PushError::Registry(_) => "registry-error",
            PushError::AttemptInFlight => "attempt-in-flight",
            PushError::Unsupported => "unsupported",
            PushError::NotInitialized => "not-initialized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("event list request failed: {0}")]
    Http(String),

    #[error("event list request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode event list: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not resolve a configuration directory for this user")]
    NoConfigDir,

    #[error("failed to access settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings at {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}
