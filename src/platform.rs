//! Seams to the host platform.
//!
//! A browser host backs these with its push manager, permission prompt,
//! notification API and window list; the desktop binary uses the surfaces in
//! [`crate::desktop`]. The core never caches anything obtained through them.

use async_trait::async_trait;

use crate::{
    delivery::RenderedNotification, permission::PermissionOutcome, PushError, PushSubscription,
};

/// The platform's push subscription manager, one per origin.
#[async_trait]
pub trait PushPlatform: Send + Sync {
    /// Whether background delivery agents and a push manager exist at all.
    fn is_supported(&self) -> bool;

    /// Registers the background delivery agent. Repeat calls are harmless.
    async fn register_agent(&self) -> Result<(), PushError>;

    /// Looks up the live subscription; it may have been revoked out of band.
    async fn current_subscription(&self) -> Result<Option<PushSubscription>, PushError>;

    /// Creates (or returns the existing) subscription scoped to the key.
    async fn subscribe(&self, application_server_key: &[u8]) -> Result<PushSubscription, PushError>;

    async fn revoke(&self, subscription: &PushSubscription) -> Result<(), PushError>;
}

#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn request(&self) -> PermissionOutcome;
}

/// Where rendered notifications are displayed.
pub trait NotificationSurface: Send + Sync {
    /// Shows the notification, replacing any visible one with the same tag.
    fn show(&self, notification: &RenderedNotification) -> Result<(), String>;

    fn close(&self, tag: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppWindow {
    pub id: String,
    pub url: String,
    pub focusable: bool,
}

/// Open application windows, as seen from the delivery agent.
#[async_trait]
pub trait WindowHost: Send + Sync {
    async fn windows(&self) -> Vec<AppWindow>;

    async fn focus(&self, window: &AppWindow) -> Result<(), String>;

    async fn open(&self, url: &str) -> Result<(), String>;
}
