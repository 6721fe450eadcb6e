//! Catalog capability and its Steam store implementation.
//!
//! Epistemic foundation:
//! - K_i: The store search returns one page of JSON rows per request
//! - K_i: Per-app pricing lives behind a separate appdetails call
//! - B_i: Store will respond within timeout (might fail)
//! - B_i: Response will be valid JSON (might fail)
//! - I^B: Network availability unknowable → retry with backoff

use crate::client::RateLimiter;
use crate::models::{
    CatalogItem, FreebieError, PriceDetail, Result, SearchFilter, StoreApiError, StoreConfig,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Query capability over the external catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch one page of items matching `filter`.
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CatalogItem>>;

    /// Fetch pricing for one app.
    ///
    /// `Ok(None)` means the store answered without a success flag.
    async fn item_detail(&self, app_id: u32) -> Result<Option<PriceDetail>>;
}

/// Search endpoint response.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<CatalogItem>,
}

/// One entry of the appdetails response, keyed by app id.
#[derive(Debug, Deserialize)]
struct AppDetailsEntry {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<AppDetailsData>,
}

#[derive(Debug, Deserialize)]
struct AppDetailsData {
    #[serde(default)]
    price_overview: Option<PriceDetail>,
}

/// Steam store HTTP client.
///
/// Features:
/// - Per-endpoint rate limiting with 429 backoff
/// - Retry with exponential backoff on network and 5xx errors
/// - Request timeout on every call
pub struct StoreClient {
    client: reqwest::Client,
    base_url: String,
    country: Option<String>,
    timeout: Duration,
    max_retries: u32,
    rate_limiter: Arc<RateLimiter>,
}

impl StoreClient {
    /// Create a new store client.
    pub fn new(config: &StoreConfig, rate_limiter: Option<Arc<RateLimiter>>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(Self::headers())
            .build()
            .map_err(FreebieError::Network)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
            timeout,
            max_retries: config.max_retries.max(1),
            rate_limiter: rate_limiter.unwrap_or_default(),
        })
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("freebie/", env!("CARGO_PKG_VERSION"))),
        );
        headers
    }

    /// GET a JSON document with retries.
    ///
    /// B_i(store available) → Result
    /// B_i(valid response) → Result
    /// I^B(rate limits) → adaptive backoff
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut last_error: Option<FreebieError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.acquire(endpoint).await;

            let response = match self.client.get(url).query(query).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        FreebieError::Timeout(self.timeout)
                    } else {
                        FreebieError::Network(e)
                    });
                    if attempt < self.max_retries - 1 {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            endpoint = endpoint,
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();
            let retry_after = retry_after(response.headers());

            self.rate_limiter
                .record_response(endpoint, status, retry_after);

            if status == 429 {
                last_error = Some(FreebieError::RateLimited {
                    retry_after_secs: retry_after.map_or(1.0, |d| d.as_secs_f64()),
                });
                // The limiter already holds the backoff; next acquire() waits it out.
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                last_error = Some(FreebieError::StoreApi(StoreApiError::ApiError {
                    status,
                    message: message.chars().take(200).collect(),
                }));

                // Client errors will not improve on retry
                if (400..500).contains(&status) {
                    break;
                }

                if attempt < self.max_retries - 1 {
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
                continue;
            }

            return response.json::<T>().await.map_err(|e| {
                FreebieError::StoreApi(StoreApiError::InvalidResponse(format!(
                    "{endpoint}: {e}"
                )))
            });
        }

        Err(last_error.unwrap_or_else(|| {
            FreebieError::StoreApi(StoreApiError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            })
        }))
    }
}

#[async_trait]
impl Catalog for StoreClient {
    async fn search(&self, filter: &SearchFilter) -> Result<Vec<CatalogItem>> {
        let url = format!("{}/search/results/", self.base_url);
        let query = search_query(filter);
        let body: SearchResponse = self.get_json("search", &url, &query).await?;
        debug!(items = body.items.len(), "Search page received");
        Ok(body.items)
    }

    async fn item_detail(&self, app_id: u32) -> Result<Option<PriceDetail>> {
        let url = format!("{}/api/appdetails", self.base_url);
        let mut query = vec![("appids", app_id.to_string())];
        if let Some(cc) = &self.country {
            query.push(("cc", cc.clone()));
        }

        let body: HashMap<String, AppDetailsEntry> =
            self.get_json("appdetails", &url, &query).await?;
        Ok(parse_app_details(app_id, body))
    }
}

/// `Retry-After` in whole seconds; HTTP-date and malformed values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn search_query(filter: &SearchFilter) -> Vec<(&'static str, String)> {
    let flag = |on: bool| (if on { "1" } else { "0" }).to_string();
    vec![
        ("specials", flag(filter.specials)),
        ("ndl", flag(filter.ndl)),
        ("json", "1".to_string()),
        ("maxprice", filter.max_price.clone()),
    ]
}

/// An app without a price overview is treated as free with no discount.
fn parse_app_details(
    app_id: u32,
    mut body: HashMap<String, AppDetailsEntry>,
) -> Option<PriceDetail> {
    let entry = body.remove(&app_id.to_string())?;
    if !entry.success {
        return None;
    }
    Some(
        entry
            .data
            .and_then(|d| d.price_overview)
            .unwrap_or_default(),
    )
}
