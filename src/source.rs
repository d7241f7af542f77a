//! # Remote Price Source Module
//!
//! ## Purpose
//! Interfaces with the government commodity-price API (data.gov.in mandi
//! rates feed) to fetch raw per-market price rows for a district and
//! commodity. The state filter is fixed per deployment region.
//!
//! ## Input/Output Specification
//! - **Input**: District and commodity filters, API credentials
//! - **Output**: Raw per-market price rows (possibly several per market)
//! - **Degradation**: A response body that is not the expected JSON object
//!   yields an empty row list rather than an error; only transport-level
//!   failures propagate
//!
//! ## Key Features
//! - Single GET per query with `api-key`, `format=json`, and state,
//!   district, commodity filters
//! - Tolerant decoding of upstream price fields (string or number)
//! - Per-source statistics for the `/stats` endpoint

use crate::config::PriceSourceConfig;
use crate::errors::{RatesError, Result};
use crate::RawPriceRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Statistics for a price source
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    /// Requests issued
    pub requests: u64,
    /// Raw rows received across all requests
    pub records_fetched: u64,
    /// Responses that failed to parse and degraded to empty
    pub parse_errors: u64,
    /// Last successful fetch
    pub last_fetch: Option<DateTime<Utc>>,
}

/// Trait for remote price sources
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get the name of this price source
    fn name(&self) -> &str;

    /// Fetch raw price rows for a district and commodity.
    ///
    /// The returned list may contain several rows per market. Transport
    /// failures propagate; an unusable response body degrades to an empty
    /// list.
    async fn fetch_prices(
        &self,
        district: &str,
        commodity: &str,
    ) -> Result<Vec<RawPriceRecord>>;
}

/// Agmarknet (data.gov.in) price source implementation
pub struct AgmarknetSource {
    config: PriceSourceConfig,
    client: Client,
    stats: RwLock<SourceStats>,
}

/// Upstream response envelope; anything not shaped like this degrades to an
/// empty record list
#[derive(Debug, Deserialize)]
struct AgmarknetResponse {
    #[serde(default)]
    records: Vec<AgmarknetRecord>,
}

/// One upstream row. Price fields arrive as strings or numbers depending on
/// the dataset revision.
#[derive(Debug, Deserialize)]
struct AgmarknetRecord {
    #[serde(rename = "Market", default)]
    market: String,
    #[serde(rename = "Min_Price", default, deserialize_with = "de_price")]
    min_price: f64,
    #[serde(rename = "Max_Price", default, deserialize_with = "de_price")]
    max_price: f64,
    #[serde(rename = "Modal_Price", default, deserialize_with = "de_price")]
    modal_price: f64,
}

/// Accept numeric or string-typed price fields; unparseable strings (for
/// example "NR" when a market did not report) read as zero.
fn de_price<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PriceField {
        Num(f64),
        Text(String),
    }

    Ok(match PriceField::deserialize(deserializer)? {
        PriceField::Num(n) => n,
        PriceField::Text(s) => s.trim().parse().unwrap_or(0.0),
    })
}

impl AgmarknetSource {
    /// Create a new source from configuration
    pub fn new(config: PriceSourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("krishivedah-rates/0.1")
            .build()
            .map_err(|e| RatesError::Network {
                details: e.to_string(),
            })?;

        Ok(Self {
            config,
            client,
            stats: RwLock::new(SourceStats::default()),
        })
    }

    /// Get source statistics
    pub fn stats(&self) -> SourceStats {
        self.stats.read().clone()
    }
}

#[async_trait]
impl PriceSource for AgmarknetSource {
    fn name(&self) -> &str {
        "agmarknet"
    }

    async fn fetch_prices(
        &self,
        district: &str,
        commodity: &str,
    ) -> Result<Vec<RawPriceRecord>> {
        let limit = self.config.page_size.to_string();
        let params = [
            ("api-key", self.config.api_key.as_str()),
            ("format", "json"),
            ("limit", limit.as_str()),
            ("filters[state]", self.config.state.as_str()),
            ("filters[district]", district),
            ("filters[commodity]", commodity),
        ];

        self.stats.write().requests += 1;

        debug!(
            "Fetching prices for district={}, commodity={}, state={}",
            district, commodity, self.config.state
        );

        // Transport errors propagate to the caller; everything after a
        // received body degrades gracefully.
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Price source returned status {}", status);
        }

        let parsed: AgmarknetResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    "Price source response was not the expected JSON object, \
                     treating as empty: {}",
                    e
                );
                self.stats.write().parse_errors += 1;
                return Ok(Vec::new());
            }
        };

        let records: Vec<RawPriceRecord> = parsed
            .records
            .into_iter()
            .map(|r| RawPriceRecord {
                market: r.market,
                min_price: r.min_price,
                max_price: r.max_price,
                modal_price: r.modal_price,
            })
            .collect();

        let mut stats = self.stats.write();
        stats.records_fetched += records.len() as u64;
        stats.last_fetch = Some(Utc::now());

        Ok(records)
    }
}
