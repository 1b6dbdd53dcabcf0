//! In-memory stand-ins for the platform, registry and feed used by unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use base64::Engine as _;
use tokio::sync::Notify;

use crate::{
    delivery::RenderedNotification,
    feed::FeedSource,
    permission::PermissionOutcome,
    platform::{AppWindow, NotificationSurface, PermissionPrompt, PushPlatform, WindowHost},
    registrar::Registry,
    FeedError, FeedSnapshot, PushError, PushSubscription, SubscriptionKey, SubscriptionKeys,
};

pub(crate) fn sample_key() -> SubscriptionKey {
    let mut raw = vec![0x04u8];
    raw.extend(1u8..=64);
    SubscriptionKey::new(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw))
}

pub(crate) fn sample_subscription() -> PushSubscription {
    PushSubscription {
        endpoint: "https://push.example/send/1".to_string(),
        expiration_time: None,
        keys: SubscriptionKeys {
            p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM".to_string(),
            auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
        },
    }
}

/// Shared, ordered record of calls across fakes.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub(crate) fn push(&self, call: &str) {
        self.0.lock().unwrap().push(call.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Lets a test hold an async call open and observe it has started.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct PlatformState {
    subscription: Option<PushSubscription>,
    last_key: Option<Vec<u8>>,
    fail_subscribe: Option<String>,
    fail_revoke: Option<String>,
    fail_lookup: Option<String>,
}

pub(crate) struct FakePlatform {
    supported: bool,
    log: CallLog,
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub(crate) fn supported(log: CallLog) -> Self {
        Self {
            supported: true,
            log,
            state: Mutex::new(PlatformState::default()),
        }
    }

    pub(crate) fn unsupported(log: CallLog) -> Self {
        Self {
            supported: false,
            ..Self::supported(log)
        }
    }

    pub(crate) fn preload_subscription(&self) {
        self.state.lock().unwrap().subscription = Some(sample_subscription());
    }

    /// Simulates the user clearing site permissions behind our back.
    pub(crate) fn revoke_out_of_band(&self) {
        self.state.lock().unwrap().subscription = None;
    }

    pub(crate) fn fail_subscribe(&self, reason: &str) {
        self.state.lock().unwrap().fail_subscribe = Some(reason.to_string());
    }

    pub(crate) fn fail_revoke(&self, reason: &str) {
        self.state.lock().unwrap().fail_revoke = Some(reason.to_string());
    }

    pub(crate) fn fail_lookup(&self, reason: &str) {
        self.state.lock().unwrap().fail_lookup = Some(reason.to_string());
    }

    pub(crate) fn subscription(&self) -> Option<PushSubscription> {
        self.state.lock().unwrap().subscription.clone()
    }

    pub(crate) fn last_key(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().last_key.clone()
    }
}

#[async_trait]
impl PushPlatform for FakePlatform {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn register_agent(&self) -> Result<(), PushError> {
        self.log.push("platform.register_agent");
        Ok(())
    }

    async fn current_subscription(&self) -> Result<Option<PushSubscription>, PushError> {
        self.log.push("platform.current_subscription");
        let state = self.state.lock().unwrap();
        if let Some(reason) = &state.fail_lookup {
            return Err(PushError::Platform(reason.clone()));
        }
        Ok(state.subscription.clone())
    }

    async fn subscribe(&self, application_server_key: &[u8]) -> Result<PushSubscription, PushError> {
        self.log.push("platform.subscribe");
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.fail_subscribe {
            return Err(PushError::Platform(reason.clone()));
        }
        state.last_key = Some(application_server_key.to_vec());
        let subscription = state
            .subscription
            .get_or_insert_with(sample_subscription)
            .clone();
        Ok(subscription)
    }

    async fn revoke(&self, subscription: &PushSubscription) -> Result<(), PushError> {
        self.log.push("platform.revoke");
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.fail_revoke {
            return Err(PushError::Platform(reason.clone()));
        }
        if state.subscription.as_ref() == Some(subscription) {
            state.subscription = None;
        }
        Ok(())
    }
}

#[derive(Default)]
struct RegistryState {
    registered: Vec<PushSubscription>,
    register_failures_left: u32,
    register_calls: u32,
    fail_unregister: bool,
}

pub(crate) struct FakeRegistry {
    key: SubscriptionKey,
    log: CallLog,
    state: Mutex<RegistryState>,
    unregister_gate: Option<Gate>,
}

impl FakeRegistry {
    pub(crate) fn new(log: CallLog) -> Self {
        Self {
            key: sample_key(),
            log,
            state: Mutex::new(RegistryState::default()),
            unregister_gate: None,
        }
    }

    /// Every unregister waits on [`Gate::release`] before answering.
    pub(crate) fn gated_unregister(log: CallLog) -> Self {
        Self {
            unregister_gate: Some(Gate::default()),
            ..Self::new(log)
        }
    }

    pub(crate) fn unregister_gate(&self) -> &Gate {
        self.unregister_gate
            .as_ref()
            .expect("registry fake is not gated")
    }

    pub(crate) fn with_key(log: CallLog, key: &str) -> Self {
        Self {
            key: SubscriptionKey::new(key),
            ..Self::new(log)
        }
    }

    /// Fails the next `count` register calls; `u32::MAX` fails them all.
    pub(crate) fn fail_register(&self, count: u32) {
        self.state.lock().unwrap().register_failures_left = count;
    }

    pub(crate) fn fail_unregister(&self, fail: bool) {
        self.state.lock().unwrap().fail_unregister = fail;
    }

    pub(crate) fn registered(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .registered
            .iter()
            .map(|subscription| subscription.endpoint.clone())
            .collect()
    }

    pub(crate) fn register_calls(&self) -> u32 {
        self.state.lock().unwrap().register_calls
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn public_key(&self) -> Result<SubscriptionKey, PushError> {
        self.log.push("registry.public_key");
        Ok(self.key.clone())
    }

    async fn register(&self, subscription: &PushSubscription) -> Result<(), PushError> {
        self.log.push("registry.register");
        let mut state = self.state.lock().unwrap();
        state.register_calls += 1;
        if state.register_failures_left > 0 {
            if state.register_failures_left != u32::MAX {
                state.register_failures_left -= 1;
            }
            return Err(PushError::Registry("HTTP 503".to_string()));
        }
        if !state
            .registered
            .iter()
            .any(|existing| existing.endpoint == subscription.endpoint)
        {
            state.registered.push(subscription.clone());
        }
        Ok(())
    }

    async fn unregister(&self, subscription: &PushSubscription) -> Result<(), PushError> {
        self.log.push("registry.unregister");
        if let Some(gate) = &self.unregister_gate {
            gate.pass().await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_unregister {
            return Err(PushError::Registry("HTTP 500".to_string()));
        }
        state
            .registered
            .retain(|existing| existing.endpoint != subscription.endpoint);
        Ok(())
    }
}

pub(crate) struct FakePermission {
    outcome: Mutex<PermissionOutcome>,
    prompts: AtomicU32,
    gate: Option<Gate>,
}

impl FakePermission {
    pub(crate) fn new(outcome: PermissionOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            prompts: AtomicU32::new(0),
            gate: None,
        }
    }

    /// Every prompt waits on [`Gate::release`] before answering.
    pub(crate) fn gated(outcome: PermissionOutcome) -> Self {
        Self {
            gate: Some(Gate::default()),
            ..Self::new(outcome)
        }
    }

    pub(crate) fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("permission fake is not gated")
    }

    pub(crate) fn answer(&self, outcome: PermissionOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub(crate) fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionPrompt for FakePermission {
    async fn request(&self) -> PermissionOutcome {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        *self.outcome.lock().unwrap()
    }
}

#[derive(Default)]
pub(crate) struct FakeSurface {
    visible: Mutex<Vec<RenderedNotification>>,
    closed: Mutex<Vec<String>>,
}

impl FakeSurface {
    pub(crate) fn visible(&self) -> Vec<RenderedNotification> {
        self.visible.lock().unwrap().clone()
    }

    pub(crate) fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl NotificationSurface for FakeSurface {
    fn show(&self, notification: &RenderedNotification) -> Result<(), String> {
        let mut visible = self.visible.lock().unwrap();
        visible.retain(|existing| existing.tag != notification.tag);
        visible.push(notification.clone());
        Ok(())
    }

    fn close(&self, tag: &str) {
        self.visible.lock().unwrap().retain(|existing| existing.tag != tag);
        self.closed.lock().unwrap().push(tag.to_string());
    }
}

#[derive(Default)]
pub(crate) struct FakeWindows {
    windows: Vec<AppWindow>,
    focused: Mutex<Vec<String>>,
    opened: Mutex<Vec<String>>,
}

impl FakeWindows {
    pub(crate) fn with_windows(windows: Vec<AppWindow>) -> Self {
        Self {
            windows,
            ..Self::default()
        }
    }

    pub(crate) fn focused(&self) -> Vec<String> {
        self.focused.lock().unwrap().clone()
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl WindowHost for FakeWindows {
    async fn windows(&self) -> Vec<AppWindow> {
        self.windows.clone()
    }

    async fn focus(&self, window: &AppWindow) -> Result<(), String> {
        self.focused.lock().unwrap().push(window.id.clone());
        Ok(())
    }

    async fn open(&self, url: &str) -> Result<(), String> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Feed source answering from a script, falling back to a snapshot whose
/// `items_count` is the call number.
#[derive(Default)]
pub(crate) struct FakeFeedSource {
    calls: Mutex<Vec<bool>>,
    script: Mutex<VecDeque<Result<FeedSnapshot, FeedError>>>,
    gate: Option<Gate>,
}

impl FakeFeedSource {
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Gate::default()),
            ..Self::default()
        }
    }

    pub(crate) fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("feed fake is not gated")
    }

    pub(crate) fn push_result(&self, result: Result<FeedSnapshot, FeedError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// The `only_classified` flag of every fetch, in order.
    pub(crate) fn calls(&self) -> Vec<bool> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for FakeFeedSource {
    async fn fetch(&self, only_classified: bool) -> Result<FeedSnapshot, FeedError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(only_classified);
            calls.len() as u64
        };
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(FeedSnapshot {
                items_count: call_number,
                ..FeedSnapshot::default()
            })
        })
    }
}
