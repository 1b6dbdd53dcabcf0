pub(crate) const PUBKEY_PATH: &str = "/push_get_pubkey";
pub(crate) const SUBSCRIBE_PATH: &str = "/push_subscribe";
pub(crate) const UNSUBSCRIBE_PATH: &str = "/push_unsubscribe";
pub(crate) const SUBSCRIPTIONS_PATH: &str = "/push_get_subscriptions";
pub(crate) const PUSH_TEST_PATH: &str = "/push_test";
pub(crate) const EVENTS_PATH: &str = "/events";
pub(crate) const EVENTS_WS_PATH: &str = "/eventsws";
pub(crate) const THUMB_PATH: &str = "/thumb";
pub(crate) const NOTIFICATION_ICON_PATH: &str = "/favicon.ico";
pub(crate) const ONLY_CLASSIFIED_PARAM: &str = "have_classification";

pub const DEFAULT_LIVE_ROUTE: &str = "/#live";
pub const DEFAULT_REGISTRY_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_REGISTRY_RETRY_BACKOFF_MS: u64 = 500;
pub(crate) const MAX_REGISTRY_RETRY_ATTEMPTS: u32 = 10;
pub(crate) const MAX_RETRY_BACKOFF_SECS: u64 = 30;

pub(crate) const STREAM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub(crate) const STREAM_LIVENESS_CHECK_INTERVAL_SECS: u64 = 15;
pub(crate) const STREAM_LIVENESS_IDLE_SECS: u64 = 90;
pub(crate) const STREAM_LIVENESS_PING_GRACE_SECS: u64 = 30;
pub(crate) const STREAM_MAX_BACKOFF_SECS: u64 = 30;

pub(crate) const NOTIFICATION_BODY_MAX_CHARS: usize = 220;
pub(crate) const LOG_PAYLOAD_MAX_CHARS: usize = 140;
