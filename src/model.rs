use serde::{Deserialize, Deserializer, Serialize};

use crate::{keycodec::url_b64_to_bytes, PushError};

/// Public key handed out by the registry for one subscribe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PushError> {
        url_b64_to_bytes(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Platform push subscription in its standard JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Detection {
    pub class: String,
    pub confidence: f64,
}

/// Inbound push payload describing one detection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushEvent {
    pub identifier: String,
    pub detection: Detection,
    pub time_string: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventItem {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub have_video: bool,
    #[serde(default)]
    pub have_thumb: bool,
    #[serde(default)]
    pub have_v_thumb: bool,
    #[serde(default)]
    pub duration_sec: i64,
    #[serde(default)]
    pub detection: Option<Detection>,
}

/// One response of the events listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeedSnapshot {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<EventItem>,
    #[serde(default)]
    pub items_count: u64,
    #[serde(default)]
    pub items_total_size: u64,
    #[serde(default)]
    pub oldest_timestamp: i64,
}

/// Registry record as listed by the backend; key material is redacted server side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisteredSubscription {
    #[serde(rename = "ID", default)]
    pub id: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub peer: String,
    #[serde(rename = "SubscriptionID", default)]
    pub subscription_id: String,
    #[serde(default)]
    pub last_success: Option<String>,
    #[serde(default)]
    pub last_failure: Option<String>,
    #[serde(default)]
    pub last_failure_message: String,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
