//! Batched, rate-limited retrieval of current prices and trade history.
//!
//! One fetch cycle plans URL-length-bounded batches, pushes each through the
//! rate gate, retries transient transport failures with bounded backoff, and
//! degrades to partial data when a batch keeps failing. Cancellation is
//! honored between batches only, so completed batches stay usable.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::batching::{plan_batches, PlanError, RequestTemplate, MAX_URL_LENGTH};
use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::retry::RetryConfig;
use crate::throttling::{RateGate, RatePolicy};
use crate::{City, HistoricalSnapshot, ItemKey, Quality, Quote, Region, UtcDateTime};

/// Errors that abort a fetch cycle before any network activity.
///
/// Per-batch transport failures never surface here; they degrade into
/// [`FetchOutcome::batches_failed`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Result of one price fetch cycle.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub quotes: Vec<Quote>,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub aborted: bool,
}

impl FetchOutcome {
    /// Some batches failed but others delivered data.
    pub const fn is_partial(&self) -> bool {
        self.batches_failed > 0 && self.batches_failed < self.batches_total
    }

    /// Every batch failed; no data at all.
    pub const fn is_empty(&self) -> bool {
        self.batches_total > 0 && self.batches_failed == self.batches_total
    }
}

/// Result of one history fetch cycle.
#[derive(Debug, Clone)]
pub struct HistoryOutcome {
    pub snapshots: Vec<HistoricalSnapshot>,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub aborted: bool,
}

/// Rate-limited client for the upstream market data API.
pub struct MarketDataClient {
    http: Arc<dyn HttpClient>,
    region: Region,
    gate: RateGate,
    retry: RetryConfig,
    max_url_length: usize,
}

impl MarketDataClient {
    pub fn new(region: Region, http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            region,
            gate: RateGate::new(&RatePolicy::default()),
            retry: RetryConfig::default(),
            max_url_length: MAX_URL_LENGTH,
        }
    }

    pub fn with_rate_gate(mut self, gate: RateGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_url_length(mut self, max_url_length: usize) -> Self {
        self.max_url_length = max_url_length;
        self
    }

    pub const fn region(&self) -> Region {
        self.region
    }

    /// Fetch current quotes for the requested keys.
    ///
    /// Response records that do not resolve against the request set are
    /// silently dropped.
    pub async fn fetch_prices(
        &self,
        keys: &[ItemKey],
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        let cities = unique_cities(keys);
        let qualities = unique_qualities(keys);
        let template = RequestTemplate::prices(self.region, &cities, &qualities);
        let batches = plan_batches(keys, &template, self.max_url_length)?;

        let lookup = key_lookup(keys);
        let mut outcome = FetchOutcome {
            quotes: Vec::new(),
            batches_total: batches.len(),
            batches_failed: 0,
            aborted: false,
        };

        for batch in &batches {
            if cancel.is_cancelled() {
                outcome.aborted = true;
                break;
            }

            self.gate.acquire().await;
            let url = template.render(batch);
            match self.request_json::<Vec<PriceRecordPayload>>(&url).await {
                Ok(records) => {
                    for payload in records {
                        if let Some(quote) = resolve_quote(payload, &lookup) {
                            outcome.quotes.push(quote);
                        }
                    }
                }
                Err(error) => {
                    warn!("price batch failed: {error}");
                    outcome.batches_failed += 1;
                }
            }
        }

        if outcome.batches_failed > 0 {
            warn!(
                "price fetch degraded: batches failed: {} of {}",
                outcome.batches_failed, outcome.batches_total
            );
        }

        Ok(outcome)
    }

    /// Fetch trade history for the requested keys. `time_scale` is the
    /// aggregation bucket in hours.
    ///
    /// Data points with a zero price or zero traded count are dropped; only
    /// fully parsed snapshots may reach the store.
    pub async fn fetch_history(
        &self,
        keys: &[ItemKey],
        time_scale: u32,
        cancel: &CancellationToken,
    ) -> Result<HistoryOutcome, FetchError> {
        let cities = unique_cities(keys);
        let template = RequestTemplate::history(self.region, &cities, time_scale);
        let batches = plan_batches(keys, &template, self.max_url_length)?;

        let lookup = key_lookup(keys);
        let mut outcome = HistoryOutcome {
            snapshots: Vec::new(),
            batches_total: batches.len(),
            batches_failed: 0,
            aborted: false,
        };

        for batch in &batches {
            if cancel.is_cancelled() {
                outcome.aborted = true;
                break;
            }

            self.gate.acquire().await;
            let url = template.render(batch);
            match self.request_json::<Vec<HistoryRecordPayload>>(&url).await {
                Ok(records) => {
                    for payload in records {
                        collect_snapshots(payload, &lookup, &mut outcome.snapshots);
                    }
                }
                Err(error) => {
                    warn!("history batch failed: {error}");
                    outcome.batches_failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, HttpError> {
        let response = self.execute_with_retry(url).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| HttpError::non_retryable(format!("malformed response body: {e}")))
    }

    async fn execute_with_retry(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let mut attempt: u32 = 0;
        loop {
            match self.http.execute(HttpRequest::get(url)).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    if !self.retry.should_retry_status(response.status)
                        || attempt >= self.retry.max_retries
                    {
                        return Err(HttpError::non_retryable(format!(
                            "http status {}",
                            response.status
                        )));
                    }
                }
                Err(error) => {
                    if !error.retryable() || attempt >= self.retry.max_retries {
                        return Err(error);
                    }
                }
            }

            let delay = self.retry.delay_for_attempt(attempt);
            attempt += 1;
            debug!("retrying batch request, attempt {attempt}");
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct PriceRecordPayload {
    item_id: String,
    city: String,
    #[serde(default)]
    quality: u8,
    #[serde(default)]
    sell_price_min: u64,
    #[serde(default)]
    sell_price_max: u64,
    #[serde(default)]
    buy_price_min: u64,
    #[serde(default)]
    buy_price_max: u64,
    #[serde(default)]
    sell_price_min_date: Option<UtcDateTime>,
    #[serde(default)]
    buy_price_max_date: Option<UtcDateTime>,
}

#[derive(Debug, Deserialize)]
struct HistoryRecordPayload {
    item_id: String,
    location: String,
    #[serde(default)]
    quality: u8,
    #[serde(default)]
    data: Vec<HistoryPointPayload>,
}

#[derive(Debug, Deserialize)]
struct HistoryPointPayload {
    #[serde(default)]
    item_count: u64,
    #[serde(default)]
    avg_price: f64,
    timestamp: UtcDateTime,
}

type KeyLookup<'a> = HashMap<(&'a str, u8, &'a str), &'a ItemKey>;

fn key_lookup(keys: &[ItemKey]) -> KeyLookup<'_> {
    keys.iter()
        .map(|key| {
            (
                (
                    key.item_id.as_str(),
                    key.quality.value(),
                    key.city.as_str(),
                ),
                key,
            )
        })
        .collect()
}

fn unique_cities(keys: &[ItemKey]) -> Vec<City> {
    let mut cities: Vec<City> = Vec::new();
    for key in keys {
        if !cities.contains(&key.city) {
            cities.push(key.city.clone());
        }
    }
    cities
}

fn unique_qualities(keys: &[ItemKey]) -> Vec<Quality> {
    let mut qualities: Vec<Quality> = Vec::new();
    for key in keys {
        if !qualities.contains(&key.quality) {
            qualities.push(key.quality);
        }
    }
    qualities
}

fn resolve_quote(payload: PriceRecordPayload, lookup: &KeyLookup<'_>) -> Option<Quote> {
    let key = lookup.get(&(
        payload.item_id.as_str(),
        payload.quality,
        payload.city.as_str(),
    ))?;

    let observed_at = payload
        .sell_price_min_date
        .or(payload.buy_price_max_date)
        .unwrap_or_else(UtcDateTime::now);

    Some(Quote {
        key: (*key).clone(),
        sell_price_min: payload.sell_price_min,
        sell_price_max: payload.sell_price_max,
        buy_price_min: payload.buy_price_min,
        buy_price_max: payload.buy_price_max,
        observed_at,
    })
}

fn collect_snapshots(
    payload: HistoryRecordPayload,
    lookup: &KeyLookup<'_>,
    output: &mut Vec<HistoricalSnapshot>,
) {
    let Some(key) = lookup.get(&(
        payload.item_id.as_str(),
        payload.quality,
        payload.location.as_str(),
    )) else {
        debug!("dropping unresolved history record for {}", payload.item_id);
        return;
    };

    for point in payload.data {
        if point.item_count == 0 || point.avg_price <= 0.0 {
            continue;
        }
        output.push(HistoricalSnapshot {
            key: (*key).clone(),
            price: point.avg_price.round() as u64,
            volume: point.item_count,
            observed_at: point.timestamp,
        });
    }
}
