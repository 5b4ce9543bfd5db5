//! Exchange rate cache refreshed from a JSON price feed.
//!
//! Readers load the current quote from an `ArcSwap` and never block; a
//! failed refresh keeps the previous quote.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::PriceConfig;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("Price request failed: {0}")]
    Http(String),

    #[error("No rate at {pointer}")]
    MissingRate { pointer: String },

    #[error("Rate is not a positive number: {0}")]
    InvalidRate(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub pair: String,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Lock-free holder of the latest quote.
#[derive(Default)]
pub struct PriceCache {
    current: ArcSwapOption<PriceQuote>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<PriceQuote>> {
        self.current.load_full()
    }

    pub fn set(&self, quote: PriceQuote) {
        self.current.store(Some(Arc::new(quote)));
    }
}

pub struct PriceUpdater {
    http: reqwest::Client,
    config: PriceConfig,
    cache: Arc<PriceCache>,
}

impl PriceUpdater {
    pub fn new(config: PriceConfig, cache: Arc<PriceCache>) -> Result<Self, PriceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PriceError::Http(e.to_string()))?;
        Ok(Self {
            http,
            config,
            cache,
        })
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// Whether the cached quote is older than the refresh interval.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.cache.get() {
            Some(quote) => {
                now - quote.fetched_at >= chrono::Duration::seconds(self.config.refresh_secs as i64)
            }
            None => true,
        }
    }

    /// Refresh when stale. Errors are logged and the old quote kept.
    pub async fn refresh_if_stale(&self) {
        if !self.config.enabled || !self.is_stale(Utc::now()) {
            return;
        }
        match self.fetch().await {
            Ok(quote) => {
                tracing::debug!(pair = %quote.pair, rate = %quote.rate, "Price refreshed");
                metrics::set_price(&quote.pair, quote.rate.to_f64().unwrap_or(0.0));
                self.cache.set(quote);
            }
            Err(e) => tracing::warn!(pair = %self.config.pair, error = %e, "Price refresh failed"),
        }
    }

    async fn fetch(&self) -> Result<PriceQuote, PriceError> {
        let document: Value = self
            .http
            .get(&self.config.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PriceError::Http(e.without_url().to_string()))?
            .json()
            .await
            .map_err(|e| PriceError::Http(e.to_string()))?;

        let rate = extract_rate(&document, &self.config.pointer)?;
        Ok(PriceQuote {
            pair: self.config.pair.clone(),
            rate,
            fetched_at: Utc::now(),
        })
    }
}

/// Read a positive rate at `pointer`, accepting numbers or numeric strings.
pub fn extract_rate(document: &Value, pointer: &str) -> Result<Decimal, PriceError> {
    let value = document
        .pointer(pointer)
        .ok_or_else(|| PriceError::MissingRate {
            pointer: pointer.to_string(),
        })?;

    let rate = match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        Value::String(s) => s.parse::<Decimal>().ok(),
        _ => None,
    };
    match rate {
        Some(rate) if rate > Decimal::ZERO => Ok(rate),
        _ => Err(PriceError::InvalidRate(value.to_string())),
    }
}
