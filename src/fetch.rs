//! Fan-out fetcher (C5): invokes the configured C3 adapters concurrently and
//! tolerates individual failures, grounded in
//! `original_source/app/services/fetcher.py::DataFetcher.fetch_all`.

use crate::adapters;
use crate::config::DataSourceConfig;
use crate::context::AppContext;
use crate::daily_cache::DailyCache;
use chrono::Datelike;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub news: Value,
    pub fun_content: Option<Value>,
    pub holiday_years: Vec<Value>,
    pub kfc: Option<Value>,
    pub stock_indices: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Runs every enabled adapter concurrently; each source's slot degrades to
/// its documented nil default independently of the others (spec §4.5).
pub async fn fetch_all(app: &AppContext, force_refresh: bool) -> FetchResult {
    let today = app.clock.business_today();
    let cache_dir = Path::new(&app.config.paths.cache_dir);

    let news_fut = async {
        let Some(DataSourceConfig::News { url, params, timeout_sec, .. }) = app
            .config
            .data_sources
            .iter()
            .find(|ds| matches!(ds, DataSourceConfig::News { enabled, .. } if *enabled))
        else {
            return empty_object();
        };
        let cache = DailyCache::new("news", cache_dir);
        cache
            .get(today, force_refresh, || {
                adapters::news::fetch_fresh(&app.http_client, url, params, Duration::from_secs(*timeout_sec))
            })
            .await
            .unwrap_or_else(empty_object)
    };

    let fun_content_fut = async {
        let Some(DataSourceConfig::FunContent { endpoints, timeout_sec, .. }) = app
            .config
            .data_sources
            .iter()
            .find(|ds| matches!(ds, DataSourceConfig::FunContent { enabled, .. } if *enabled))
        else {
            return None;
        };
        let cache = DailyCache::new("fun_content", cache_dir);
        cache
            .get(today, force_refresh, || {
                adapters::fun_content::fetch_fresh(&app.http_client, endpoints, today, Duration::from_secs(*timeout_sec))
            })
            .await
    };

    let kfc_fut = async {
        let Some(DataSourceConfig::CrazyThursday { url, timeout_sec, .. }) = app
            .config
            .data_sources
            .iter()
            .find(|ds| matches!(ds, DataSourceConfig::CrazyThursday { enabled, .. } if *enabled))
        else {
            return None;
        };
        let cache = DailyCache::new("kfc", cache_dir);
        cache
            .get(today, force_refresh, || {
                adapters::kfc::fetch_fresh(&app.http_client, url, today, Duration::from_secs(*timeout_sec))
            })
            .await
    };

    let holiday_fut = async {
        let Some(DataSourceConfig::Holiday { mirrors, canonical_raw_url, timeout_sec, .. }) = app
            .config
            .data_sources
            .iter()
            .find(|ds| matches!(ds, DataSourceConfig::Holiday { enabled, .. } if *enabled))
        else {
            return Vec::new();
        };
        let years = [today.year() - 1, today.year(), today.year() + 1];
        let mut fetches = Vec::with_capacity(years.len());
        for year in years {
            fetches.push(adapters::holiday_source::fetch_year(
                &app.http_client,
                mirrors,
                canonical_raw_url,
                cache_dir,
                year,
                today,
                Duration::from_secs(*timeout_sec),
            ));
        }
        futures::future::join_all(fetches).await.into_iter().flatten().collect()
    };

    let stock_fut = async {
        let Some(DataSourceConfig::StockIndex { quote_url, cache_ttl_sec, timeout_sec, .. }) = app
            .config
            .data_sources
            .iter()
            .find(|ds| matches!(ds, DataSourceConfig::StockIndex { enabled, .. } if *enabled))
        else {
            return None;
        };
        adapters::stock_index::fetch_fresh(
            &app.http_client,
            &app.stock_index_cache,
            quote_url,
            Duration::from_secs(*cache_ttl_sec),
            today,
            Duration::from_secs(*timeout_sec),
        )
        .await
    };

    let (news, fun_content, kfc, holiday_years, stock_indices) =
        tokio::join!(news_fut, fun_content_fut, kfc_fut, holiday_fut, stock_fut);

    FetchResult { news, fun_content, holiday_years, kfc, stock_indices }
}
