use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    consts::{DEFAULT_LIVE_ROUTE, DEFAULT_REGISTRY_RETRY_ATTEMPTS, DEFAULT_REGISTRY_RETRY_BACKOFF_MS},
    registrar::RetryPolicy,
    util::{restrict_file_permissions, unique_time_suffix},
    SettingsError,
};

const SETTINGS_DIR: &str = "camwatch";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StoredSettings {
    pub base_url: String,
    pub only_classified: bool,
    pub live_route: String,
    pub registry_retry_attempts: u32,
    pub registry_retry_backoff_ms: u64,
    pub desktop_notifications: bool,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            only_classified: true,
            live_route: DEFAULT_LIVE_ROUTE.to_string(),
            registry_retry_attempts: DEFAULT_REGISTRY_RETRY_ATTEMPTS,
            registry_retry_backoff_ms: DEFAULT_REGISTRY_RETRY_BACKOFF_MS,
            desktop_notifications: true,
        }
    }
}

impl StoredSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.registry_retry_attempts, self.registry_retry_backoff_ms)
    }

    /// Server URL to use, preferring `override_url` (the `--server` flag).
    pub fn server(&self, override_url: Option<&str>) -> Result<String, SettingsError> {
        normalize_base_url(override_url.unwrap_or(&self.base_url))
    }
}

/// Partial update from the `config` command; `None` keeps the stored value.
#[derive(Debug, Default, Clone)]
pub struct SettingsUpdate {
    pub base_url: Option<String>,
    pub only_classified: Option<bool>,
    pub live_route: Option<String>,
    pub registry_retry_attempts: Option<u32>,
    pub registry_retry_backoff_ms: Option<u64>,
    pub desktop_notifications: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.only_classified.is_none()
            && self.live_route.is_none()
            && self.registry_retry_attempts.is_none()
            && self.registry_retry_backoff_ms.is_none()
            && self.desktop_notifications.is_none()
    }

    pub fn apply(self, current: &StoredSettings) -> Result<StoredSettings, SettingsError> {
        let base_url = match self.base_url {
            Some(url) => normalize_base_url(&url)?,
            None => current.base_url.clone(),
        };
        let live_route = match self.live_route {
            Some(route) => normalize_live_route(&route),
            None => current.live_route.clone(),
        };
        let retry = RetryPolicy::new(
            self.registry_retry_attempts
                .unwrap_or(current.registry_retry_attempts),
            0,
        );

        Ok(StoredSettings {
            base_url,
            only_classified: self.only_classified.unwrap_or(current.only_classified),
            live_route,
            registry_retry_attempts: retry.attempts(),
            registry_retry_backoff_ms: self
                .registry_retry_backoff_ms
                .unwrap_or(current.registry_retry_backoff_ms),
            desktop_notifications: self
                .desktop_notifications
                .unwrap_or(current.desktop_notifications),
        })
    }
}

pub fn settings_path() -> Result<PathBuf, SettingsError> {
    let base = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(base.join(SETTINGS_DIR).join(SETTINGS_FILE))
}

pub fn read_settings(path: &Path) -> Result<StoredSettings, SettingsError> {
    if !path.exists() {
        log::debug!("settings: {path:?} not found, using defaults");
        return Ok(StoredSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str::<StoredSettings>(&content).map_err(|error| SettingsError::Parse {
        path: path.to_path_buf(),
        detail: error.to_string(),
    })
}

/// Writes through a temp file and a rename so a crash never leaves half a file.
pub fn save_settings(path: &Path, settings: &StoredSettings) -> Result<(), SettingsError> {
    let io_error = |source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let content = serde_json::to_string_pretty(settings).map_err(|error| SettingsError::Parse {
        path: path.to_path_buf(),
        detail: error.to_string(),
    })?;
    let temp_path = path.with_extension(format!(
        "json.tmp-{}-{}",
        std::process::id(),
        unique_time_suffix()
    ));
    fs::write(&temp_path, content).map_err(io_error)?;
    restrict_file_permissions(&temp_path);
    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error(error));
    }
    log::debug!("settings: written to {path:?}");
    Ok(())
}

pub fn normalize_base_url(input: &str) -> Result<String, SettingsError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SettingsError::InvalidUrl(
            "server URL is required (set it with `camwatch config --server <URL>`)".to_string(),
        ));
    }

    let url = reqwest::Url::parse(trimmed)
        .map_err(|error| SettingsError::InvalidUrl(format!("{trimmed}: {error}")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(SettingsError::InvalidUrl(
            "server URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

fn normalize_live_route(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return DEFAULT_LIVE_ROUTE.to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
