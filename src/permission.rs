use std::fmt;

use crate::{platform::PermissionPrompt, PushError};

/// Normalized result of a notification permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
    /// The prompt was closed without a decision; the platform lets us ask again sooner.
    Dismissed,
}

impl PermissionOutcome {
    /// Maps the platform's `"granted" | "denied" | "default"` strings.
    pub fn from_platform(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "granted" => PermissionOutcome::Granted,
            "denied" => PermissionOutcome::Denied,
            _ => PermissionOutcome::Dismissed,
        }
    }
}

impl fmt::Display for PermissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PermissionOutcome::Granted => "granted",
            PermissionOutcome::Denied => "denied",
            PermissionOutcome::Dismissed => "dismissed",
        };
        f.write_str(label)
    }
}

/// Asks for notification permission once.
///
/// Must run inside a user gesture; some platforms silently refuse otherwise.
pub async fn request_permission(prompt: &dyn PermissionPrompt) -> Result<(), PushError> {
    let outcome = prompt.request().await;
    match outcome {
        PermissionOutcome::Granted => {
            log::debug!("permission: granted");
            Ok(())
        }
        PermissionOutcome::Denied => {
            log::info!("permission: denied by user");
            Err(PushError::Permission(outcome))
        }
        PermissionOutcome::Dismissed => {
            log::info!("permission: prompt dismissed, can be asked again");
            Err(PushError::Permission(outcome))
        }
    }
}
