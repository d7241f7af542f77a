//! # Krishivedah Mandi Rates Service
//!
//! ## Overview
//! This library implements the live mandi (wholesale market) price lookup
//! backend for the Krishivedah farmer platform: a day-keyed read-through
//! cache in front of the government commodity-price API, with per-market
//! price aggregation.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `source`: HTTP client for the remote government price API
//! - `aggregate`: Per-market averaging of raw price records
//! - `storage`: Persistent day-keyed cache store backed by sled
//! - `service`: Cache-or-fetch orchestration consumed by the API layer
//! - `api`: REST endpoints serving the farmer-facing UI
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Commodity and district selections from the UI
//! - **Output**: Per-market aggregated min/max/modal prices for the day
//! - **Caching**: One cache entry per (district, commodity, date); entries
//!   are written once and never invalidated within the day
//!
//! ## Usage
//! ```rust,no_run
//! use krishivedah_rates::{Config, RateService};
//! use krishivedah_rates::source::AgmarknetSource;
//! use krishivedah_rates::storage::SledCacheStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let store = Arc::new(SledCacheStore::new(config.storage.clone()).await?);
//!     let source = Arc::new(AgmarknetSource::new(config.source.clone())?);
//!     let service = RateService::new(store, source);
//!     let report = service.get_rates("Tomato", "Sangli").await?;
//!     println!("{} markets reporting", report.rates.len());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod aggregate;
pub mod api;
pub mod config;
pub mod errors;
pub mod service;
pub mod source;
pub mod storage;

// Re-exports for convenience
pub use config::Config;
pub use errors::{RatesError, Result};
pub use service::{RateOrigin, RateReport, RateService};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifies one day's cache entry for a (district, commodity) selection.
///
/// The `date` is always the UTC calendar date of the evaluation instant;
/// there is no historical query path. District and commodity strings are
/// carried through verbatim (case- and whitespace-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuery {
    /// District to query, as selected in the UI
    pub district: String,
    /// Commodity to query, as selected in the UI
    pub commodity: String,
    /// UTC calendar date the query applies to
    pub date: NaiveDate,
}

impl RateQuery {
    /// Create a query for an explicit date
    pub fn new(
        district: impl Into<String>,
        commodity: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            district: district.into(),
            commodity: commodity.into(),
            date,
        }
    }

    /// Create a query for today, using the UTC calendar date
    pub fn for_today(
        district: impl Into<String>,
        commodity: impl Into<String>,
    ) -> Self {
        Self::new(district, commodity, Utc::now().date_naive())
    }

    /// Cache key in the exact format `{district}_{commodity}_{date}`.
    ///
    /// The date renders as `YYYY-MM-DD`, so queries differing only in date
    /// never collide.
    pub fn cache_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.district,
            self.commodity,
            self.date.format("%Y-%m-%d")
        )
    }
}

/// One raw per-market price row from the remote source.
///
/// Multiple rows may share the same market name on the same day; those are
/// sub-samples that the aggregator averages together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRecord {
    /// Market (mandi) name, exactly as reported upstream
    pub market: String,
    /// Minimum transaction price
    pub min_price: f64,
    /// Maximum transaction price
    pub max_price: f64,
    /// Modal (most frequent) transaction price
    pub modal_price: f64,
}

/// Per-market aggregate: the arithmetic mean of all raw rows sharing the
/// market name, rounded half away from zero to a non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRate {
    /// Market (mandi) name
    pub market: String,
    /// Mean minimum price, rounded
    pub min_price: u64,
    /// Mean maximum price, rounded
    pub max_price: u64,
    /// Mean modal price, rounded
    pub modal_price: u64,
}

/// Document stored in the cache under `RateQuery::cache_key`.
///
/// Written exactly once on first miss for a (district, commodity, date)
/// triple and read for the remainder of that date. Never updated in place;
/// a new day produces a new key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// District the entry was computed for
    pub district: String,
    /// Commodity the entry was computed for
    pub commodity: String,
    /// UTC calendar date the entry covers
    pub date: NaiveDate,
    /// Aggregated per-market rates (may be empty)
    pub rates: Vec<AggregatedRate>,
    /// When the entry was computed
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build the entry for a query from freshly aggregated rates
    pub fn new(query: &RateQuery, rates: Vec<AggregatedRate>) -> Self {
        Self {
            district: query.district.clone(),
            commodity: query.commodity.clone(),
            date: query.date,
            rates,
            created_at: Utc::now(),
        }
    }
}

/// Application state shared across API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Config>,
    pub service: Arc<service::RateService>,
    pub store: Arc<storage::SledCacheStore>,
    pub source: Arc<source::AgmarknetSource>,
}
