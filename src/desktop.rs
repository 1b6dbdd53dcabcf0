//! Desktop stand-ins for the browser notification surface and window list.

#[cfg(any(target_os = "macos", target_os = "linux", target_os = "windows"))]
use std::process::Command;
#[cfg(target_os = "macos")]
use std::thread;
use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
#[cfg(target_os = "macos")]
use mac_notification_sys::{MainButton, Notification, NotificationResponse};
use tokio::sync::mpsc;

use crate::{
    consts::NOTIFICATION_BODY_MAX_CHARS,
    delivery::{AgentEvent, RenderedNotification},
    platform::{AppWindow, NotificationSurface, WindowHost},
    util::truncate_message,
};

/// Shows notifications natively on macOS and as log lines elsewhere.
///
/// Clicks are fed back to the delivery agent as [`AgentEvent::Click`].
pub struct DesktopNotifier {
    native: bool,
    clicks: Option<mpsc::UnboundedSender<AgentEvent>>,
    visible: Mutex<HashSet<String>>,
}

impl DesktopNotifier {
    pub fn new(native: bool, clicks: Option<mpsc::UnboundedSender<AgentEvent>>) -> Self {
        Self {
            native,
            clicks,
            visible: Mutex::new(HashSet::new()),
        }
    }

    /// Banner copy of `notification`, with the body capped for the desktop.
    fn banner(notification: &RenderedNotification) -> RenderedNotification {
        RenderedNotification {
            body: truncate_message(&notification.body, NOTIFICATION_BODY_MAX_CHARS),
            ..notification.clone()
        }
    }

    fn remember(&self, tag: &str) -> bool {
        !self
            .visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.to_string())
    }
}

impl NotificationSurface for DesktopNotifier {
    fn show(&self, notification: &RenderedNotification) -> Result<(), String> {
        if self.remember(&notification.tag) {
            log::debug!("notification: replacing tag={}", notification.tag);
        }
        let notification = Self::banner(notification);

        if !self.native {
            log::info!("notification: {}: {}", notification.title, notification.body);
            return Ok(());
        }

        #[cfg(target_os = "macos")]
        {
            send_macos_notification(notification, self.clicks.clone());
            Ok(())
        }
        #[cfg(not(target_os = "macos"))]
        {
            log::info!("notification: {}: {}", notification.title, notification.body);
            Ok(())
        }
    }

    fn close(&self, tag: &str) {
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag);
        if self.clicks.is_none() {
            log::debug!("notification: closed tag={tag} with no click route");
        }
    }
}

#[cfg(target_os = "macos")]
fn send_macos_notification(
    notification: RenderedNotification,
    clicks: Option<mpsc::UnboundedSender<AgentEvent>>,
) {
    thread::spawn(move || {
        ensure_macos_notification_application();

        let mut native = Notification::new();
        native
            .title(&notification.title)
            .message(&notification.body)
            .main_button(MainButton::SingleAction("Open"))
            .close_button("Dismiss")
            .default_sound()
            .wait_for_click(true)
            .asynchronous(false);

        match native.send() {
            Ok(NotificationResponse::Click) | Ok(NotificationResponse::ActionButton(_)) => {
                if let Some(clicks) = clicks {
                    let _ = clicks.send(AgentEvent::Click(notification.tag));
                }
            }
            Ok(_) => {}
            Err(error) => {
                log::warn!("notification: failed to show macOS notification: {error}");
            }
        }
    });
}

#[cfg(target_os = "macos")]
fn ensure_macos_notification_application() {
    static INIT_NOTIFICATION_APP: std::sync::Once = std::sync::Once::new();
    INIT_NOTIFICATION_APP.call_once(|| {
        for bundle_id in ["com.apple.Terminal", "com.apple.Finder"] {
            match mac_notification_sys::set_application(bundle_id) {
                Ok(_) => return,
                Err(error) => {
                    log::debug!("notification: failed to set bundle id {bundle_id}: {error}");
                }
            }
        }
    });
}

/// Window host backed by the system browser. It cannot see existing tabs, so
/// every click opens the live view anew.
#[derive(Debug, Default)]
pub struct SystemBrowser;

#[async_trait]
impl WindowHost for SystemBrowser {
    async fn windows(&self) -> Vec<AppWindow> {
        Vec::new()
    }

    async fn focus(&self, window: &AppWindow) -> Result<(), String> {
        self.open(&window.url).await
    }

    async fn open(&self, url: &str) -> Result<(), String> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || open_external_url(&url))
            .await
            .map_err(|error| format!("Failed to open URL: {error}"))?
    }
}

pub(crate) fn open_external_url(url: &str) -> Result<(), String> {
    let candidate = url.trim();
    if candidate.is_empty() {
        return Err("Missing URL".to_string());
    }
    let parsed = reqwest::Url::parse(candidate).map_err(|error| format!("Invalid URL: {error}"))?;
    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(format!("Unsupported URL scheme: {scheme}"));
    }

    #[cfg(target_os = "macos")]
    let status = Command::new("open").arg(candidate).status();
    #[cfg(target_os = "linux")]
    let status = Command::new("xdg-open").arg(candidate).status();
    #[cfg(target_os = "windows")]
    let status = Command::new("cmd")
        .arg("/C")
        .arg("start")
        .arg("")
        .arg(candidate)
        .status();
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    let status: std::io::Result<std::process::ExitStatus> = Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "no URL opener on this platform",
    ));

    let status = status.map_err(|error| format!("Failed to open URL: {error}"))?;
    if !status.success() {
        return Err(format!(
            "Failed to open URL (exit code {})",
            status.code().unwrap_or(-1)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(tag: &str) -> RenderedNotification {
        RenderedNotification {
            title: "Person detected!".to_string(),
            body: "At 12:30:05 the security camera detected a person (confidence 87%).".to_string(),
            tag: tag.to_string(),
            image: "https://cam.local/thumb?id=42".to_string(),
            icon: "https://cam.local/favicon.ico".to_string(),
        }
    }

    #[test]
    fn log_surface_tracks_tags() {
        let notifier = DesktopNotifier::new(false, None);
        notifier.show(&rendered("42")).unwrap();
        assert!(notifier.remember("42"));

        notifier.close("42");
        assert!(!notifier.remember("42"));
    }

    #[test]
    fn banner_caps_long_bodies() {
        let mut long = rendered("42");
        long.body = "y".repeat(400);

        let banner = DesktopNotifier::banner(&long);
        assert_eq!(banner.body.chars().count(), NOTIFICATION_BODY_MAX_CHARS + 3);
        assert!(banner.body.ends_with("..."));
        assert_eq!(banner.tag, "42");
        assert_eq!(DesktopNotifier::banner(&rendered("7")), rendered("7"));
    }

    #[test]
    fn opener_rejects_non_web_urls() {
        assert_eq!(open_external_url("  "), Err("Missing URL".to_string()));
        assert!(open_external_url("file:///etc/passwd")
            .unwrap_err()
            .contains("Unsupported URL scheme"));
        assert!(open_external_url("::").unwrap_err().starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn browser_lists_no_windows() {
        assert!(SystemBrowser.windows().await.is_empty());
    }
}
