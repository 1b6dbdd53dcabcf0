//! Foreground owner of "is this browser subscribed".
//!
//! [`SubscriptionController`] holds the only [`SubscriptionState`] of a page
//! session. The toggle is rendered from [`ToggleView`], which is derived from
//! the state and never stored separately. Every transition is published on a
//! broadcast channel so the view and telemetry see `Error(reason)` even though
//! the controller resolves it to a stable state straight away.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::broadcast;

use crate::{
    permission,
    platform::{PermissionPrompt, PushPlatform},
    registrar::{Registrar, Registry, RetryPolicy},
    PushError, PushSubscription,
};

const TRANSITION_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub tag: &'static str,
    pub detail: String,
}

impl From<&PushError> for FailureReason {
    fn from(error: &PushError) -> Self {
        Self {
            tag: error.tag(),
            detail: error.to_string(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Unknown,
    Unsupported,
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
    Error(FailureReason),
}

impl SubscriptionState {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Subscribing | SubscriptionState::Unsubscribing
        )
    }

    pub fn toggle_view(&self) -> ToggleView {
        let (visible, checked, enabled) = match self {
            SubscriptionState::Unknown => (true, false, false),
            SubscriptionState::Unsupported => (false, false, false),
            SubscriptionState::Unsubscribed => (true, false, true),
            SubscriptionState::Subscribing => (true, true, false),
            SubscriptionState::Subscribed => (true, true, true),
            SubscriptionState::Unsubscribing => (true, false, false),
            SubscriptionState::Error(_) => (true, false, false),
        };
        ToggleView {
            visible,
            checked,
            enabled,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Unknown => f.write_str("Unknown"),
            SubscriptionState::Unsupported => f.write_str("Unsupported"),
            SubscriptionState::Unsubscribed => f.write_str("Unsubscribed"),
            SubscriptionState::Subscribing => f.write_str("Subscribing"),
            SubscriptionState::Subscribed => f.write_str("Subscribed"),
            SubscriptionState::Unsubscribing => f.write_str("Unsubscribing"),
            SubscriptionState::Error(reason) => write!(f, "Error({reason})"),
        }
    }
}

/// What the notification toggle should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleView {
    pub visible: bool,
    pub checked: bool,
    pub enabled: bool,
}

struct ControllerInner {
    state: SubscriptionState,
    last_failure: Option<FailureReason>,
}

pub struct SubscriptionController {
    platform: Arc<dyn PushPlatform>,
    permission: Arc<dyn PermissionPrompt>,
    registrar: Registrar,
    inner: Mutex<ControllerInner>,
    transitions: broadcast::Sender<SubscriptionState>,
}

impl SubscriptionController {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        permission: Arc<dyn PermissionPrompt>,
        registry: Arc<dyn Registry>,
        retry: RetryPolicy,
    ) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            registrar: Registrar::new(platform.clone(), registry, retry),
            platform,
            permission,
            inner: Mutex::new(ControllerInner {
                state: SubscriptionState::Unknown,
                last_failure: None,
            }),
            transitions,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.lock().state.clone()
    }

    pub fn toggle_view(&self) -> ToggleView {
        self.lock().state.toggle_view()
    }

    /// Reason of the most recent failed attempt, kept for telemetry.
    pub fn last_failure(&self) -> Option<FailureReason> {
        self.lock().last_failure.clone()
    }

    pub fn watch_transitions(&self) -> broadcast::Receiver<SubscriptionState> {
        self.transitions.subscribe()
    }

    /// Resolves the startup state from the platform and the registry.
    ///
    /// An existing platform subscription is re-sent to the registry before it
    /// counts as `Subscribed`, which also repairs a registration that failed
    /// in an earlier session. Calls after the first return the current state.
    pub async fn initialize(&self) -> SubscriptionState {
        if self.lock().state != SubscriptionState::Unknown {
            return self.state();
        }

        if !self.platform.is_supported() {
            log::info!("subscription: push not supported, toggle hidden");
            return self.settle(SubscriptionState::Unsupported);
        }

        match self.registrar.resync().await {
            Ok(Some(_)) => self.settle(SubscriptionState::Subscribed),
            Ok(None) => self.settle(SubscriptionState::Unsubscribed),
            Err(error) => {
                log::warn!("subscription: startup probe failed: {error}");
                self.fail(&error, SubscriptionState::Unsubscribed)
            }
        }
    }

    /// Handles a user flip of the toggle.
    ///
    /// Must be called from the user gesture itself so the permission prompt
    /// is allowed. A command arriving while an attempt runs is rejected with
    /// [`PushError::AttemptInFlight`]; asking for the state the controller is
    /// already in is a no-op.
    pub async fn set_enabled(&self, enabled: bool) -> Result<SubscriptionState, PushError> {
        if !self.begin(enabled)? {
            return Ok(self.state());
        }

        if enabled {
            match self.subscribe_steps().await {
                Ok(_) => Ok(self.settle(SubscriptionState::Subscribed)),
                Err(error) => {
                    self.fail(&error, SubscriptionState::Unsubscribed);
                    Err(error)
                }
            }
        } else {
            match self.registrar.unsubscribe().await {
                Ok(()) => Ok(self.settle(SubscriptionState::Unsubscribed)),
                Err(error) => {
                    // A registry error here means the platform subscription
                    // survived but lost its registry record.
                    let fallback = match error {
                        PushError::Registry(_) => SubscriptionState::Unsubscribed,
                        _ => SubscriptionState::Subscribed,
                    };
                    self.fail(&error, fallback);
                    Err(error)
                }
            }
        }
    }

    async fn subscribe_steps(&self) -> Result<PushSubscription, PushError> {
        permission::request_permission(self.permission.as_ref()).await?;
        let key = self.registrar.fetch_key().await?;
        self.registrar.subscribe(&key).await
    }

    /// Claims the single attempt slot. `Ok(false)` means nothing to do.
    fn begin(&self, enabled: bool) -> Result<bool, PushError> {
        let mut inner = self.lock();
        let next = match (&inner.state, enabled) {
            (SubscriptionState::Unknown, _) => return Err(PushError::NotInitialized),
            (SubscriptionState::Unsupported, _) => return Err(PushError::Unsupported),
            (SubscriptionState::Subscribing, _)
            | (SubscriptionState::Unsubscribing, _)
            | (SubscriptionState::Error(_), _) => return Err(PushError::AttemptInFlight),
            (SubscriptionState::Unsubscribed, false) | (SubscriptionState::Subscribed, true) => {
                return Ok(false)
            }
            (SubscriptionState::Unsubscribed, true) => SubscriptionState::Subscribing,
            (SubscriptionState::Subscribed, false) => SubscriptionState::Unsubscribing,
        };
        self.transition(&mut inner, next);
        Ok(true)
    }

    fn settle(&self, next: SubscriptionState) -> SubscriptionState {
        let mut inner = self.lock();
        self.transition(&mut inner, next.clone());
        next
    }

    /// Publishes `Error(reason)` and resolves to `fallback` under one lock, so
    /// readers of [`SubscriptionController::state`] never see a half-finished attempt.
    fn fail(&self, error: &PushError, fallback: SubscriptionState) -> SubscriptionState {
        let reason = FailureReason::from(error);
        let mut inner = self.lock();
        log::warn!(
            "subscription: attempt failed from {} ({}): {}",
            inner.state,
            reason.tag,
            reason.detail
        );
        inner.last_failure = Some(reason.clone());
        self.transition(&mut inner, SubscriptionState::Error(reason));
        self.transition(&mut inner, fallback.clone());
        fallback
    }

    fn transition(&self, inner: &mut ControllerInner, next: SubscriptionState) {
        log::debug!("subscription: {} -> {}", inner.state, next);
        inner.state = next.clone();
        // Nobody listening is fine.
        let _ = self.transitions.send(next);
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
