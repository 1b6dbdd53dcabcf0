//! Keeps the platform push subscription and the remote registry in step.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    consts::{
        DEFAULT_REGISTRY_RETRY_ATTEMPTS, DEFAULT_REGISTRY_RETRY_BACKOFF_MS,
        MAX_REGISTRY_RETRY_ATTEMPTS, MAX_RETRY_BACKOFF_SECS,
    },
    platform::PushPlatform,
    util::truncate_message,
    PushError, PushSubscription, SubscriptionKey,
};

/// The backend's subscription registry. Both write calls are idempotent.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetches the current key; the backend may rotate it, so callers never cache it.
    async fn public_key(&self) -> Result<SubscriptionKey, PushError>;

    async fn register(&self, subscription: &PushSubscription) -> Result<(), PushError>;

    async fn unregister(&self, subscription: &PushSubscription) -> Result<(), PushError>;
}

/// Bounded retry for registry calls. Platform calls are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_backoff_ms: u64) -> Self {
        Self {
            attempts: attempts.clamp(1, MAX_REGISTRY_RETRY_ATTEMPTS),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(failed_attempts.saturating_sub(1)).unwrap_or(u32::MAX);
        std::cmp::min(
            self.initial_backoff.saturating_mul(factor),
            Duration::from_secs(MAX_RETRY_BACKOFF_SECS),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_REGISTRY_RETRY_ATTEMPTS,
            DEFAULT_REGISTRY_RETRY_BACKOFF_MS,
        )
    }
}

pub struct Registrar {
    platform: Arc<dyn PushPlatform>,
    registry: Arc<dyn Registry>,
    retry: RetryPolicy,
}

impl Registrar {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        registry: Arc<dyn Registry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            platform,
            registry,
            retry,
        }
    }

    pub async fn fetch_key(&self) -> Result<SubscriptionKey, PushError> {
        let key = self
            .with_retry("fetch key", || self.registry.public_key())
            .await?;
        if key.is_empty() {
            return Err(PushError::Registry(
                "registry returned an empty subscription key".to_string(),
            ));
        }
        Ok(key)
    }

    /// Creates the platform subscription for `key` and records it with the registry.
    ///
    /// A registry failure is returned as-is; the platform subscription stays in
    /// place and is picked up again by [`Registrar::resync`].
    pub async fn subscribe(&self, key: &SubscriptionKey) -> Result<PushSubscription, PushError> {
        let key_bytes = key.to_bytes()?;
        if !self.platform.is_supported() {
            return Err(PushError::Platform(
                "no push capability on this platform".to_string(),
            ));
        }

        self.platform.register_agent().await?;
        let subscription = self.platform.subscribe(&key_bytes).await?;
        log::debug!(
            "registrar: platform subscription ready endpoint={}",
            truncate_message(&subscription.endpoint, 60)
        );

        self.with_retry("register", || self.registry.register(&subscription))
            .await?;
        log::info!("registrar: subscription registered");
        Ok(subscription)
    }

    /// Retracts the subscription from the registry, then revokes it at the platform.
    ///
    /// Without a platform subscription this returns without touching either side.
    /// If the registry refuses, the platform subscription is revoked anyway and
    /// the backend prunes the stale record on its next failed push. If the
    /// platform refuses, the registry record is restored; a
    /// [`PushError::Registry`] result means the restore failed too.
    pub async fn unsubscribe(&self) -> Result<(), PushError> {
        let Some(subscription) = self.platform.current_subscription().await? else {
            log::debug!("registrar: no platform subscription, nothing to remove");
            return Ok(());
        };

        if let Err(error) = self
            .with_retry("unregister", || self.registry.unregister(&subscription))
            .await
        {
            log::warn!("registrar: registry kept the subscription ({error}), revoking anyway");
        }

        if let Err(error) = self.platform.revoke(&subscription).await {
            log::warn!("registrar: platform revoke failed: {error}");
            self.with_retry("restore", || self.registry.register(&subscription))
                .await?;
            return Err(error);
        }

        log::info!("registrar: subscription removed");
        Ok(())
    }

    /// Re-sends an existing platform subscription to the registry.
    pub async fn resync(&self) -> Result<Option<PushSubscription>, PushError> {
        let Some(subscription) = self.platform.current_subscription().await? else {
            return Ok(None);
        };
        self.with_retry("resync", || self.registry.register(&subscription))
            .await?;
        Ok(Some(subscription))
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PushError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PushError>>,
    {
        let mut failed = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error @ PushError::Registry(_)) if failed + 1 < self.retry.attempts => {
                    failed += 1;
                    let delay = self.retry.backoff_for(failed);
                    log::warn!(
                        "registry: {what} failed (attempt {failed}/{}): {error}; retrying in {}ms",
                        self.retry.attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
