//! Daily cache (C2): a per-namespace, date-keyed JSON cache with atomic
//! write and stale-fallback read.
//!
//! The only variation point in
//! `original_source/app/services/daily_cache.py`'s `DailyCache` abstract
//! base class is `fetch_fresh()`; per spec §9 Design Notes this is modelled
//! here as a fetcher closure passed to `get`, not as a trait object or a
//! subclass hook.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    date: String,
    data: Value,
    fetched_at: i64,
}

pub struct DailyCache {
    namespace: String,
    cache_dir: PathBuf,
}

impl DailyCache {
    pub fn new(namespace: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        DailyCache {
            namespace: namespace.into(),
            cache_dir: cache_dir.into(),
        }
    }

    fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.json", self.namespace))
    }

    fn is_valid(&self, date: NaiveDate) -> bool {
        self.load_entry()
            .map(|entry| entry.date == date.format("%Y-%m-%d").to_string())
            .unwrap_or(false)
    }

    fn load_entry(&self) -> Option<CacheEntry> {
        let path = self.cache_file();
        let contents = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str::<CacheEntry>(&contents).ok()
    }

    fn load(&self) -> Option<Value> {
        self.load_entry().map(|e| e.data)
    }

    fn save(&self, date: NaiveDate, data: &Value) -> std::io::Result<()> {
        let entry = CacheEntry {
            date: date.format("%Y-%m-%d").to_string(),
            data: data.clone(),
            fetched_at: chrono::Utc::now().timestamp_millis(),
        };
        let contents = serde_json::to_string(&entry)?;
        crate::atomic::write_atomic_str(&self.cache_file(), &contents)
    }

    /// Implements the five-step `get` algorithm from spec §4.2: valid
    /// on-disk entry wins unless `force_refresh`; a fresh fetch is saved and
    /// returned; a failed fetch falls back to whatever is on disk regardless
    /// of its age (the stale fallback); otherwise `None`.
    pub async fn get<F, Fut>(&self, date: NaiveDate, force_refresh: bool, fetch_fresh: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Value>>,
    {
        if !force_refresh && self.is_valid(date) {
            if let Some(v) = self.load() {
                return Some(v);
            }
        }

        match fetch_fresh().await {
            Some(fresh) => {
                if let Err(e) = self.save(date, &fresh) {
                    tracing::warn!(namespace = %self.namespace, error = %e, "failed to persist daily cache entry");
                }
                Some(fresh)
            }
            None => {
                if let Some(stale) = self.load() {
                    tracing::warn!(namespace = %self.namespace, "fetch_fresh failed, serving stale cache");
                    Some(stale)
                } else {
                    None
                }
            }
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
    }

    #[tokio::test]
    async fn fresh_fetch_is_saved_and_returned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::new("news", dir.path());
        let result = cache.get(today(), false, || async { Some(serde_json::json!({"a": 1})) }).await;
        assert_eq!(result, Some(serde_json::json!({"a": 1})));
        assert!(cache.is_valid(today()));
    }

    #[tokio::test]
    async fn second_call_same_day_reuses_cache_without_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::new("news", dir.path());
        cache.get(today(), false, || async { Some(serde_json::json!({"v": 1})) }).await;

        let mut calls = 0;
        let result = cache
            .get(today(), false, || {
                calls += 1;
                async { Some(serde_json::json!({"v": 2})) }
            })
            .await;
        assert_eq!(calls, 0);
        assert_eq!(result, Some(serde_json::json!({"v": 1})));
    }

    #[tokio::test]
    async fn stale_fallback_on_failed_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::new("news", dir.path());
        cache.get(today(), false, || async { Some(serde_json::json!({"v": 1})) }).await;

        let yesterday = NaiveDate::from_ymd_opt(2026, 7, 27).unwrap();
        let _ = yesterday; // the saved entry's date no longer matches "today" below
        let tomorrow = NaiveDate::from_ymd_opt(2026, 7, 29).unwrap();
        let result = cache.get(tomorrow, false, || async { None }).await;
        assert_eq!(result, Some(serde_json::json!({"v": 1})));
    }

    #[tokio::test]
    async fn no_cache_and_failed_fetch_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::new("news", dir.path());
        let result = cache.get(today(), false, || async { None }).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_valid_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::new("news", dir.path());
        cache.get(today(), false, || async { Some(serde_json::json!({"v": 1})) }).await;
        let result = cache.get(today(), true, || async { Some(serde_json::json!({"v": 2})) }).await;
        assert_eq!(result, Some(serde_json::json!({"v": 2})));
    }
}
