//! Stock-index adapter, grounded in
//! `original_source/app/services/stock_index.py`. Maintains its own
//! in-memory TTL cache (held in the application context, guarded by its own
//! mutex) and degrades to a stale, `is_stale=true` copy of the last success
//! rather than failing outright.

use crate::context::{StockIndexCache, StockIndexCacheEntry};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Fixed emission order from spec §4.3; missing entries get placeholder
/// rows rather than being omitted.
pub const INDEX_ORDER: [&str; 5] = ["000001", "399001", "399006", "HSI", "DJIA"];

/// Index code to market mapping (spec §3 `StockItem`, `market ∈ {A,HK,US}`).
fn market_for(code: &str) -> &'static str {
    match code {
        "000001" | "399001" | "399006" => "A",
        "HSI" => "HK",
        "DJIA" => "US",
        _ => "A",
    }
}

#[derive(Debug, Deserialize)]
struct EastmoneyResponse {
    rc: i64,
    data: Option<EastmoneyData>,
}

#[derive(Debug, Deserialize)]
struct EastmoneyData {
    diff: Vec<EastmoneyDiffItem>,
}

#[derive(Debug, Deserialize)]
struct EastmoneyDiffItem {
    f2: Option<f64>,
    f3: Option<f64>,
    f4: Option<f64>,
    f12: String,
    f14: String,
}

fn is_trading_day(market: &str, date: NaiveDate) -> bool {
    // The real exchange-calendar oracle is an external collaborator; absent
    // one, fall back to the weekday heuristic for every market, per spec
    // §4.3.
    let _ = market;
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn placeholder_row(code: &str) -> Value {
    serde_json::json!({
        "code": code,
        "name": code,
        "price": "--",
        "change": "--",
        "change_pct": "--",
        "trend": "flat",
        "market": market_for(code),
        "is_trading_day": false,
    })
}

fn trend_from_change_pct(change_pct: f64) -> &'static str {
    if change_pct > 0.0 {
        "up"
    } else if change_pct < 0.0 {
        "down"
    } else {
        "flat"
    }
}

fn process_quotes(raw: &[EastmoneyDiffItem], business_date: NaiveDate) -> Value {
    let mut by_code: std::collections::HashMap<&str, &EastmoneyDiffItem> = std::collections::HashMap::new();
    for item in raw {
        by_code.insert(item.f12.as_str(), item);
    }

    let rows: Vec<Value> = INDEX_ORDER
        .iter()
        .map(|code| match by_code.get(code) {
            Some(item) => serde_json::json!({
                "code": item.f12,
                "name": item.f14,
                "price": item.f2,
                "change": item.f4,
                "change_pct": item.f3,
                "trend": item.f3.map(trend_from_change_pct).unwrap_or("flat"),
                "market": market_for(code),
                "is_trading_day": is_trading_day(code, business_date),
            }),
            None => placeholder_row(code),
        })
        .collect();

    serde_json::json!({ "indices": rows, "is_stale": false })
}

async fn fetch_quotes(client: &reqwest::Client, quote_url: &str, timeout: Duration) -> Option<Vec<EastmoneyDiffItem>> {
    super::fetch_with_timeout(timeout, async {
        let codes = INDEX_ORDER.join(",");
        let resp = client
            .get(quote_url)
            .query(&[("fltt", "2"), ("fields", "f2,f3,f4,f12,f14"), ("secids", codes.as_str())])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let parsed: EastmoneyResponse = resp.json().await.ok()?;
        if parsed.rc != 0 {
            return None;
        }
        Some(serde_json::to_value(parsed.data?.diff).ok()?)
    })
    .await
    .and_then(|v| serde_json::from_value(v).ok())
}

fn stale_copy(payload: &Value) -> Value {
    let mut v = payload.clone();
    if let Some(obj) = v.as_object_mut() {
        obj.insert("is_stale".to_string(), Value::Bool(true));
    }
    v
}

/// Double-checked-locking TTL gate around a single quote URL's cache entry.
pub async fn fetch_fresh(
    client: &reqwest::Client,
    cache: &StockIndexCache,
    quote_url: &str,
    cache_ttl: Duration,
    business_date: NaiveDate,
    timeout: Duration,
) -> Option<Value> {
    {
        let entries = cache.entries.lock().await;
        if let Some(entry) = entries.get(quote_url) {
            if StockIndexCache::is_fresh(entry, cache_ttl) {
                return Some(entry.payload.clone());
            }
        }
    }

    match fetch_quotes(client, quote_url, timeout).await {
        Some(items) => {
            let payload = process_quotes(&items, business_date);
            let mut entries = cache.entries.lock().await;
            // Re-check under the write lock: a concurrent fetch may have
            // already refreshed this entry while we were awaiting network I/O.
            if let Some(entry) = entries.get(quote_url) {
                if StockIndexCache::is_fresh(entry, cache_ttl) {
                    return Some(entry.payload.clone());
                }
            }
            entries.insert(
                quote_url.to_string(),
                StockIndexCacheEntry {
                    payload: payload.clone(),
                    fetched_at: std::time::Instant::now(),
                },
            );
            Some(payload)
        }
        None => {
            let entries = cache.entries.lock().await;
            entries.get(quote_url).map(|entry| stale_copy(&entry.payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_order_is_emitted_even_with_missing_codes() {
        let items = vec![EastmoneyDiffItem {
            f2: Some(3000.0),
            f3: Some(1.5),
            f4: Some(44.0),
            f12: "000001".to_string(),
            f14: "上证指数".to_string(),
        }];
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let result = process_quotes(&items, date);
        let codes: Vec<_> = result["indices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["code"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(codes, INDEX_ORDER.to_vec());
        assert_eq!(result["indices"][1]["price"], "--");
    }

    #[test]
    fn every_row_carries_its_market() {
        let items = vec![EastmoneyDiffItem {
            f2: Some(3000.0),
            f3: Some(1.5),
            f4: Some(44.0),
            f12: "HSI".to_string(),
            f14: "恒生指数".to_string(),
        }];
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let result = process_quotes(&items, date);
        let markets: Vec<_> = result["indices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["market"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(markets, vec!["A", "A", "A", "HK", "US"]);
    }

    #[test]
    fn trend_follows_change_pct_sign() {
        assert_eq!(trend_from_change_pct(1.2), "up");
        assert_eq!(trend_from_change_pct(-1.2), "down");
        assert_eq!(trend_from_change_pct(0.0), "flat");
    }

    #[tokio::test]
    async fn falls_back_to_stale_copy_on_failed_refetch() {
        let cache = StockIndexCache::default();
        {
            let mut entries = cache.entries.lock().await;
            entries.insert(
                "http://10.255.255.1/quote".to_string(),
                StockIndexCacheEntry {
                    payload: serde_json::json!({"indices": [], "is_stale": false}),
                    fetched_at: std::time::Instant::now() - Duration::from_secs(1000),
                },
            );
        }
        let client = reqwest::Client::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let result = fetch_fresh(
            &client,
            &cache,
            "http://10.255.255.1/quote",
            Duration::from_secs(60),
            date,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result.unwrap()["is_stale"], Value::Bool(true));
    }
}
