//! Application context (C12): the process-lifecycle container that replaces
//! module-level globals. Constructed once at startup from validated
//! configuration and handed to every component by reference, per spec §9
//! Design Notes ("process-wide mutable state ... should be held inside an
//! explicit application-context object").

use crate::clock::CalendarClock;
use crate::config::AppConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// One cached stock-index response, keyed by the adapter's quote URL so a
/// single process can serve more than one stock-index source if configured.
pub struct StockIndexCacheEntry {
    pub payload: serde_json::Value,
    pub fetched_at: Instant,
}

#[derive(Default)]
pub struct StockIndexCache {
    pub entries: Mutex<HashMap<String, StockIndexCacheEntry>>,
}

impl StockIndexCache {
    pub fn is_fresh(entry: &StockIndexCacheEntry, ttl: Duration) -> bool {
        entry.fetched_at.elapsed() < ttl
    }
}

/// Process-wide state handed by reference through the orchestrator, the
/// calendar clock, and the stock-index adapter.
pub struct AppContext {
    pub config: AppConfig,
    pub clock: CalendarClock,
    /// Single-flight in-process generation lock (spec §4.9 step 1).
    pub generation_lock: Mutex<()>,
    pub stock_index_cache: StockIndexCache,
    pub http_client: reqwest::Client,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let clock = CalendarClock::new(&config.timezone.business, &config.timezone.display);
        let http_client = reqwest::Client::builder()
            .build()
            .expect("reqwest client configuration is static and always valid");
        AppContext {
            config,
            clock,
            generation_lock: Mutex::new(()),
            stock_index_cache: StockIndexCache::default(),
            http_client,
        }
    }
}
