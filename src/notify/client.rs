//! Authenticated delivery of ledger events.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::{LedgerConfig, SecretString};
use crate::notify::events::LedgerEvent;
use crate::notify::{NotifyError, NotifyResult};
use crate::observability::metrics;

/// Header carrying the shared secret on every internal call.
pub const INTERNAL_API_KEY_HEADER: &str = "x-internal-api-key";

/// Destination for ledger events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &LedgerEvent) -> NotifyResult<()>;
}

/// HTTP client posting each event to `{base_url}{event-kind}`.
pub struct NotificationClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
    timeout_secs: u64,
}

impl NotificationClient {
    pub fn new(config: &LedgerConfig, api_key: Option<SecretString>) -> NotifyResult<Self> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url: Url = base
            .parse()
            .map_err(|e| NotifyError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self, event: &LedgerEvent) -> NotifyResult<Url> {
        self.base_url
            .join(event.kind().as_str())
            .map_err(|e| NotifyError::InvalidUrl(e.to_string()))
    }
}

#[async_trait]
impl EventSink for NotificationClient {
    async fn send(&self, event: &LedgerEvent) -> NotifyResult<()> {
        let api_key = self.api_key.as_ref().ok_or(NotifyError::MissingApiKey)?;

        let response = self
            .http
            .post(self.endpoint(event)?)
            .header(INTERNAL_API_KEY_HEADER, api_key.expose())
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout_secs)
                } else {
                    NotifyError::Http(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: body.chars().take(256).collect(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for NotificationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Validate and deliver one event. Failures are logged and counted, never
/// retried; the next cycle re-derives state from chain and store.
pub async fn notify_best_effort(sink: &dyn EventSink, event: LedgerEvent) -> bool {
    let kind = event.kind();
    let result = match event.validate() {
        Ok(()) => sink.send(&event).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            tracing::debug!(event = %kind, tx_hash = %event.tx_hash(), "Ledger notified");
            metrics::record_notification(kind.as_str(), true);
            true
        }
        Err(e) => {
            tracing::warn!(event = %kind, tx_hash = %event.tx_hash(), error = %e, "Ledger notification failed");
            metrics::record_notification(kind.as_str(), false);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::events::DepositConfirmed;
    use uuid::Uuid;

    fn event() -> LedgerEvent {
        LedgerEvent::Confirmed(DepositConfirmed {
            deposit_id: Uuid::nil(),
            tx_hash: "abc123".into(),
            confirmations: 20,
        })
    }

    #[test]
    fn test_endpoint_appends_kind() {
        let config = LedgerConfig {
            base_url: "http://ledger.local/internal/webhooks".into(),
            timeout_secs: 5,
        };
        let client = NotificationClient::new(&config, Some(SecretString::new("k"))).unwrap();
        assert_eq!(
            client.endpoint(&event()).unwrap().as_str(),
            "http://ledger.local/internal/webhooks/deposit-confirmed"
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_sending() {
        let client = NotificationClient::new(&LedgerConfig::default(), None).unwrap();
        assert!(matches!(client.send(&event()).await, Err(NotifyError::MissingApiKey)));
        assert!(!notify_best_effort(&client, event()).await);
    }
}
