//! HTTP client for the camera server: subscription registry, event list and
//! the push diagnostics endpoints.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::{
    consts::{
        EVENTS_PATH, ONLY_CLASSIFIED_PARAM, PUBKEY_PATH, PUSH_TEST_PATH, SUBSCRIBE_PATH,
        SUBSCRIPTIONS_PATH, UNSUBSCRIBE_PATH,
    },
    feed::FeedSource,
    registrar::Registry,
    util::{redact_url, server_url, truncate_message},
    FeedError, FeedSnapshot, PushError, PushSubscription, RegisteredSubscription,
    SubscriptionKey,
};

const ERROR_BODY_MAX_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Registry records as the backend reports them, key material redacted.
    pub async fn subscriptions(&self) -> Result<Vec<RegisteredSubscription>, PushError> {
        let response = self
            .client
            .get(server_url(&self.base_url, SUBSCRIPTIONS_PATH))
            .send()
            .await
            .map_err(|error| PushError::Registry(format!("failed to list subscriptions: {error}")))?;
        let response = ensure_success(response, "subscription list")
            .await
            .map_err(PushError::Registry)?;

        response
            .json::<Vec<RegisteredSubscription>>()
            .await
            .map_err(|error| PushError::Decode(format!("failed to decode subscriptions: {error}")))
    }

    /// Asks the backend to send a test push to every registered subscription.
    pub async fn push_test(&self) -> Result<(), PushError> {
        let response = self
            .client
            .get(server_url(&self.base_url, PUSH_TEST_PATH))
            .send()
            .await
            .map_err(|error| PushError::Registry(format!("failed to request test push: {error}")))?;
        ensure_success(response, "test push")
            .await
            .map_err(PushError::Registry)?;
        Ok(())
    }

    async fn post_subscription(
        &self,
        path: &str,
        subscription: &PushSubscription,
    ) -> Result<Response, PushError> {
        let endpoint = server_url(&self.base_url, path);
        log::debug!("backend: POST {}", redact_url(&endpoint));
        self.client
            .post(endpoint)
            .json(subscription)
            .send()
            .await
            .map_err(|error| PushError::Registry(format!("request to {path} failed: {error}")))
    }
}

#[async_trait]
impl Registry for BackendClient {
    async fn public_key(&self) -> Result<SubscriptionKey, PushError> {
        let response = self
            .client
            .get(server_url(&self.base_url, PUBKEY_PATH))
            .send()
            .await
            .map_err(|error| PushError::Registry(format!("failed to fetch public key: {error}")))?;
        let response = ensure_success(response, "public key")
            .await
            .map_err(PushError::Registry)?;

        let text = response
            .text()
            .await
            .map_err(|error| PushError::Registry(format!("failed to read public key: {error}")))?;
        Ok(SubscriptionKey::new(text))
    }

    async fn register(&self, subscription: &PushSubscription) -> Result<(), PushError> {
        let response = self.post_subscription(SUBSCRIBE_PATH, subscription).await?;
        ensure_success(response, "subscribe")
            .await
            .map_err(PushError::Registry)?;
        Ok(())
    }

    async fn unregister(&self, subscription: &PushSubscription) -> Result<(), PushError> {
        let response = self.post_subscription(UNSUBSCRIBE_PATH, subscription).await?;
        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("backend: subscription already absent from registry");
            return Ok(());
        }
        ensure_success(response, "unsubscribe")
            .await
            .map_err(PushError::Registry)?;
        Ok(())
    }
}

#[async_trait]
impl FeedSource for BackendClient {
    async fn fetch(&self, only_classified: bool) -> Result<FeedSnapshot, FeedError> {
        let mut request = self.client.get(server_url(&self.base_url, EVENTS_PATH));
        if only_classified {
            request = request.query(&[(ONLY_CLASSIFIED_PARAM, "1")]);
        }

        let response = request
            .send()
            .await
            .map_err(|error| FeedError::Http(error.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response body>".to_string());
            return Err(FeedError::Status {
                status,
                body: truncate_message(&body, ERROR_BODY_MAX_CHARS),
            });
        }

        response
            .json::<FeedSnapshot>()
            .await
            .map_err(|error| FeedError::Decode(error.to_string()))
    }
}

async fn ensure_success(response: Response, what: &str) -> Result<Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unable to read response body>".to_string());
    Err(format!(
        "{what} request failed with HTTP {status}: {}",
        truncate_message(&body, ERROR_BODY_MAX_CHARS)
    ))
}
