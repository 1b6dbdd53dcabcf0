//! Background delivery agent: turns push payloads into notifications and
//! routes notification clicks to the live view.
//!
//! The agent never sees the subscription controller. A payload may arrive
//! after the user unsubscribed; it is rendered anyway.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    consts::{LOG_PAYLOAD_MAX_CHARS, NOTIFICATION_ICON_PATH, THUMB_PATH},
    platform::{NotificationSurface, WindowHost},
    util::{server_url, truncate_message},
    PushEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
    /// Event identifier; a repeat push with the same tag replaces the visible one.
    pub tag: String,
    pub image: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Push(Vec<u8>),
    Click(String),
}

/// Builds the notification for one detection. The sender's `TimeString` is
/// used verbatim and the body is never shortened here.
pub fn render(event: &PushEvent, base_url: &str) -> RenderedNotification {
    let class = event.detection.class.trim();
    let percent = (event.detection.confidence * 100.0).round() as i64;
    let body = format!(
        "At {} the security camera detected a {class} (confidence {percent}%).",
        event.time_string
    );

    RenderedNotification {
        title: format!("{} detected!", capitalize(class)),
        body,
        tag: event.identifier.clone(),
        image: resource_url(base_url, THUMB_PATH, Some(("id", &event.identifier))),
        icon: resource_url(base_url, NOTIFICATION_ICON_PATH, None),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn resource_url(base_url: &str, path: &str, query: Option<(&str, &str)>) -> String {
    let raw = server_url(base_url, path);
    let Some((key, value)) = query else {
        return raw;
    };
    match reqwest::Url::parse(&raw) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(key, value);
            url.to_string()
        }
        Err(_) => format!("{raw}?{key}={value}"),
    }
}

pub struct DeliveryAgent {
    surface: Arc<dyn NotificationSurface>,
    windows: Arc<dyn WindowHost>,
    base_url: String,
    live_route: String,
}

impl DeliveryAgent {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        windows: Arc<dyn WindowHost>,
        base_url: impl Into<String>,
        live_route: impl Into<String>,
    ) -> Self {
        Self {
            surface,
            windows,
            base_url: base_url.into(),
            live_route: live_route.into(),
        }
    }

    /// Decodes and shows one push payload. Malformed payloads are logged and dropped.
    pub fn handle_push(&self, payload: &[u8]) -> Option<RenderedNotification> {
        let event: PushEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(error) => {
                log::warn!(
                    "delivery: dropping malformed push payload ({error}): {}",
                    truncate_message(&String::from_utf8_lossy(payload), LOG_PAYLOAD_MAX_CHARS)
                );
                return None;
            }
        };

        let notification = render(&event, &self.base_url);
        if let Err(error) = self.surface.show(&notification) {
            log::warn!("delivery: failed to show notification tag={}: {error}", notification.tag);
            return None;
        }
        log::debug!(
            "delivery: shown tag={} class={}",
            notification.tag,
            event.detection.class
        );
        Some(notification)
    }

    /// Closes the clicked notification and brings up the live view.
    pub async fn handle_click(&self, tag: &str) {
        self.surface.close(tag);

        let live_url = self.live_url();
        let existing = self
            .windows
            .windows()
            .await
            .into_iter()
            .find(|window| window.focusable && window.url == live_url);

        let result = match existing {
            Some(window) => {
                log::debug!("delivery: focusing live window id={}", window.id);
                self.windows.focus(&window).await
            }
            None => {
                log::debug!("delivery: opening live view");
                self.windows.open(&live_url).await
            }
        };
        if let Err(error) = result {
            log::warn!("delivery: failed to show live view: {error}");
        }
    }

    pub fn live_url(&self) -> String {
        server_url(&self.base_url, &self.live_route)
    }

    /// Processes events until every sender is dropped.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<AgentEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::Push(payload) => {
                    self.handle_push(&payload);
                }
                AgentEvent::Click(tag) => self.handle_click(&tag).await,
            }
        }
        log::debug!("delivery: event channel closed");
    }
}
