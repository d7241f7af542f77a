//! # Rate Service Module
//!
//! ## Purpose
//! Orchestrates the day-keyed cache-or-fetch path: check the cache store by
//! key, fall back to the remote price source on a miss, aggregate, write the
//! result back best-effort, and return the aggregate to the caller.
//!
//! ## Input/Output Specification
//! - **Input**: Commodity and district strings (passed through verbatim)
//! - **Output**: `RateReport` with the aggregated rates and their origin
//!   (cache hit or fresh fetch)
//! - **Failure semantics**: cache read failures degrade to a miss, cache
//!   write failures are swallowed, only transport-level source errors
//!   propagate
//!
//! ## Key Features
//! - Explicitly injected store and source (no globals), testable with fakes
//! - Typed outcomes so callers can distinguish cache hits, fresh fetches,
//!   and the degraded empty result
//! - Per-key single-flight guard deduplicating concurrent first-of-day
//!   fetches within this process; the store itself stays last-writer-wins

use crate::aggregate::aggregate;
use crate::errors::Result;
use crate::source::PriceSource;
use crate::storage::RateCacheStore;
use crate::{AggregatedRate, CacheEntry, RateQuery};
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where the returned rates came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOrigin {
    /// Served from the day-keyed cache, no remote call made
    Cache,
    /// Fetched from the remote source during this call
    Fresh,
}

/// Result of a rates lookup.
///
/// An empty `rates` with `origin: Fresh` is the degraded outcome: the
/// source answered but carried no usable rows, and an empty entry was still
/// cached for the rest of the day.
#[derive(Debug, Clone, Serialize)]
pub struct RateReport {
    /// Per-market aggregates, in source insertion order
    pub rates: Vec<AggregatedRate>,
    /// Cache hit or fresh fetch
    pub origin: RateOrigin,
    /// UTC calendar date the report covers
    pub date: NaiveDate,
}

/// Service statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    /// Lookups answered from cache
    pub cache_hits: u64,
    /// Lookups that fell through to the remote source
    pub cache_misses: u64,
    /// Cache reads that failed and were treated as misses
    pub cache_read_errors: u64,
    /// Cache writes that failed and were swallowed
    pub cache_write_errors: u64,
    /// Remote fetches performed
    pub fetches: u64,
}

/// Cache-or-fetch orchestrator for mandi rates
pub struct RateService {
    store: Arc<dyn RateCacheStore>,
    source: Arc<dyn PriceSource>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    stats: RwLock<ServiceStats>,
}

impl RateService {
    /// Create a service over an injected store and source
    pub fn new(
        store: Arc<dyn RateCacheStore>,
        source: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            store,
            source,
            inflight: DashMap::new(),
            stats: RwLock::new(ServiceStats::default()),
        }
    }

    /// Get today's rates for a commodity in a district.
    ///
    /// "Today" is the UTC calendar date of the evaluation instant. The
    /// commodity and district strings are not validated against any list;
    /// they flow into the cache key and the upstream query unchanged.
    pub async fn get_rates(
        &self,
        commodity: &str,
        district: &str,
    ) -> Result<RateReport> {
        self.get_rates_for(RateQuery::for_today(district, commodity))
            .await
    }

    /// Get rates for an explicit query. Exposed for callers that already
    /// hold a `RateQuery`; `get_rates` is the UI-facing path.
    pub async fn get_rates_for(&self, query: RateQuery) -> Result<RateReport> {
        let key = query.cache_key();

        if let Some(entry) = self.cache_lookup(&key).await {
            self.stats.write().cache_hits += 1;
            debug!("Cache hit for {}", key);
            return Ok(RateReport {
                rates: entry.rates,
                origin: RateOrigin::Cache,
                date: query.date,
            });
        }
        self.stats.write().cache_misses += 1;

        // Per-key single-flight: one task fetches, concurrent callers for
        // the same key wait and then find the entry on re-check. Callers in
        // other processes still race last-writer-wins on the store.
        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        if let Some(entry) = self.cache_lookup(&key).await {
            drop(guard);
            self.inflight.remove(&key);
            self.stats.write().cache_hits += 1;
            debug!("Cache hit for {} after in-flight fetch", key);
            return Ok(RateReport {
                rates: entry.rates,
                origin: RateOrigin::Cache,
                date: query.date,
            });
        }

        let outcome = self.fetch_and_store(&query, &key).await;
        drop(guard);
        self.inflight.remove(&key);

        let rates = outcome?;
        Ok(RateReport {
            rates,
            origin: RateOrigin::Fresh,
            date: query.date,
        })
    }

    /// Get service statistics
    pub fn stats(&self) -> ServiceStats {
        self.stats.read().clone()
    }

    /// Cache lookup where a read failure counts as a miss
    async fn cache_lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read for {} failed, treating as miss: {}", key, e);
                self.stats.write().cache_read_errors += 1;
                None
            }
        }
    }

    /// Fetch from the source, aggregate, and write back best-effort.
    ///
    /// An empty fetch still writes an entry with no rates, so same-day
    /// re-queries hit the cache instead of hammering the source.
    async fn fetch_and_store(
        &self,
        query: &RateQuery,
        key: &str,
    ) -> Result<Vec<AggregatedRate>> {
        self.stats.write().fetches += 1;
        let records = self
            .source
            .fetch_prices(&query.district, &query.commodity)
            .await?;

        let rates = aggregate(&records);
        info!(
            "Fetched {} rows for {}, {} markets after aggregation",
            records.len(),
            key,
            rates.len()
        );

        let entry = CacheEntry::new(query, rates.clone());
        if let Err(e) = self.store.put(key, &entry).await {
            warn!("Cache write for {} failed, continuing: {}", key, e);
            self.stats.write().cache_write_errors += 1;
        }

        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RatesError;
    use crate::RawPriceRecord;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    /// In-memory store with switchable read/write failure
    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, CacheEntry>>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        puts: AtomicU64,
    }

    #[async_trait]
    impl RateCacheStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(RatesError::Store {
                    details: "simulated read failure".to_string(),
                });
            }
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RatesError::Store {
                    details: "simulated write failure".to_string(),
                });
            }
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.entries
                .lock()
                .await
                .insert(key.to_string(), entry.clone());
            Ok(())
        }
    }

    /// Source returning a fixed row set, with call counting and optional
    /// artificial latency / failure
    struct FixedSource {
        records: Mutex<Vec<RawPriceRecord>>,
        calls: AtomicU64,
        delay: Option<Duration>,
        fail: AtomicBool,
    }

    impl FixedSource {
        fn new(records: Vec<RawPriceRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                calls: AtomicU64::new(0),
                delay: None,
                fail: AtomicBool::new(false),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl PriceSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_prices(
            &self,
            _district: &str,
            _commodity: &str,
        ) -> Result<Vec<RawPriceRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RatesError::Network {
                    details: "simulated connection refused".to_string(),
                });
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.records.lock().await.clone())
        }
    }

    fn row(market: &str, min: f64, max: f64, modal: f64) -> RawPriceRecord {
        RawPriceRecord {
            market: market.to_string(),
            min_price: min,
            max_price: max,
            modal_price: modal,
        }
    }

    fn query() -> RateQuery {
        RateQuery::new(
            "Sangli",
            "Tomato",
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        )
    }

    fn service(
        store: Arc<MemoryStore>,
        source: Arc<FixedSource>,
    ) -> RateService {
        RateService::new(store, source)
    }

    #[tokio::test]
    async fn test_first_call_fetches_second_hits_cache() {
        let store = Arc::new(MemoryStore::default());
        let source = Arc::new(FixedSource::new(vec![
            row("Sangli APMC", 380.0, 430.0, 400.0),
            row("Sangli APMC", 390.0, 450.0, 420.0),
            row("Kavathe Mahankal", 420.0, 480.0, 450.0),
        ]));
        let svc = service(store.clone(), source.clone());

        let first = svc.get_rates_for(query()).await.unwrap();
        assert_eq!(first.origin, RateOrigin::Fresh);
        assert_eq!(first.rates.len(), 2);
        assert_eq!(first.rates[0].market, "Sangli APMC");
        assert_eq!(first.rates[0].modal_price, 410);
        assert_eq!(first.rates[1].market, "Kavathe Mahankal");
        assert_eq!(first.rates[1].modal_price, 450);

        // Mutate the source; the cached answer must not change.
        source.records.lock().await.clear();

        let second = svc.get_rates_for(query()).await.unwrap();
        assert_eq!(second.origin, RateOrigin::Cache);
        assert_eq!(second.rates, first.rates);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_fetch_still_writes_entry() {
        let store = Arc::new(MemoryStore::default());
        let source = Arc::new(FixedSource::new(Vec::new()));
        let svc = service(store.clone(), source.clone());

        let report = svc.get_rates_for(query()).await.unwrap();
        assert_eq!(report.origin, RateOrigin::Fresh);
        assert!(report.rates.is_empty());

        let stored = store
            .entries
            .lock()
            .await
            .get(&query().cache_key())
            .cloned()
            .unwrap();
        assert!(stored.rates.is_empty());

        // Next call is a cache hit, not another fetch.
        let again = svc.get_rates_for(query()).await.unwrap();
        assert_eq!(again.origin, RateOrigin::Cache);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_entry_returned_verbatim() {
        let store = Arc::new(MemoryStore::default());
        let cached = CacheEntry::new(
            &query(),
            vec![AggregatedRate {
                market: "Tasgaon".to_string(),
                min_price: 100,
                max_price: 200,
                modal_price: 150,
            }],
        );
        store
            .entries
            .lock()
            .await
            .insert(query().cache_key(), cached.clone());

        // The source would answer differently, but is never consulted.
        let source =
            Arc::new(FixedSource::new(vec![row("Elsewhere", 1.0, 2.0, 1.5)]));
        let svc = service(store, source.clone());

        let report = svc.get_rates_for(query()).await.unwrap();
        assert_eq!(report.origin, RateOrigin::Cache);
        assert_eq!(report.rates, cached.rates);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_read_failure_degrades_to_fetch() {
        let store = Arc::new(MemoryStore::default());
        store.fail_reads.store(true, Ordering::SeqCst);
        let source =
            Arc::new(FixedSource::new(vec![row("Tasgaon", 90.0, 110.0, 100.0)]));
        let svc = service(store, source);

        let report = svc.get_rates_for(query()).await.unwrap();
        assert_eq!(report.origin, RateOrigin::Fresh);
        assert_eq!(report.rates.len(), 1);
        assert!(svc.stats().cache_read_errors > 0);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        let source =
            Arc::new(FixedSource::new(vec![row("Tasgaon", 90.0, 110.0, 100.0)]));
        let svc = service(store, source);

        let report = svc.get_rates_for(query()).await.unwrap();
        assert_eq!(report.rates.len(), 1);
        assert_eq!(svc.stats().cache_write_errors, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let store = Arc::new(MemoryStore::default());
        let source = Arc::new(FixedSource::new(Vec::new()));
        source.fail.store(true, Ordering::SeqCst);
        let svc = service(store, source);

        let result = svc.get_rates_for(query()).await;
        assert!(matches!(result, Err(RatesError::Network { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let store = Arc::new(MemoryStore::default());
        let source = Arc::new(
            FixedSource::new(vec![row("Tasgaon", 90.0, 110.0, 100.0)])
                .with_delay(Duration::from_millis(50)),
        );
        let svc = Arc::new(service(store.clone(), source.clone()));

        let a = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.get_rates_for(query()).await })
        };
        let b = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.get_rates_for(query()).await })
        };

        let report_a = a.await.unwrap().unwrap();
        let report_b = b.await.unwrap().unwrap();

        assert_eq!(report_a.rates, report_b.rates);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }
}
