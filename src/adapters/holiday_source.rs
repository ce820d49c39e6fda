//! Holiday year-fetcher, grounded in
//! `original_source/app/services/holiday.py::_fetch_year_data` /
//! `_build_urls` / `_get_ttl`. Used by the holiday aggregator (C4), not
//! called directly by the orchestrator.

use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

fn cache_path(cache_dir: &Path, year: i32) -> PathBuf {
    cache_dir.join("holidays").join(format!("{year}.json"))
}

/// Mirror URLs in priority order, then the canonical GitHub raw URL last.
pub fn build_urls(mirrors: &[String], canonical_raw_url: &str, year: i32) -> Vec<String> {
    let mut urls: Vec<String> = mirrors.iter().map(|m| format!("{m}/{year}.json")).collect();
    urls.push(format!("{canonical_raw_url}/{year}.json"));
    urls
}

enum Ttl {
    Permanent,
    Bounded(Duration),
}

fn ttl_for(year: i32, today_year: i32) -> Ttl {
    if year < today_year {
        Ttl::Permanent
    } else if year == today_year {
        Ttl::Bounded(Duration::from_secs(7 * 24 * 3600))
    } else {
        Ttl::Bounded(Duration::from_secs(12 * 3600))
    }
}

fn is_cache_valid(path: &Path, year: i32, today_year: i32) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    let now = SystemTime::now();
    if modified > now {
        // Clock skew: a future mtime can't be trusted as fresh.
        return false;
    }
    match ttl_for(year, today_year) {
        Ttl::Permanent => true,
        Ttl::Bounded(ttl) => now.duration_since(modified).map(|age| age < ttl).unwrap_or(false),
    }
}

fn read_cache(path: &Path) -> Option<Value> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

async fn try_network(client: &reqwest::Client, urls: &[String], timeout: Duration) -> Option<Value> {
    for url in urls {
        let attempt = super::fetch_with_timeout(timeout, async {
            let resp = client.get(url).send().await.ok()?;
            if !resp.status().is_success() {
                return None;
            }
            resp.json::<Value>().await.ok()
        })
        .await;
        if let Some(value) = attempt {
            return Some(value);
        }
    }
    None
}

/// Fetches one year's raw holiday document, consulting cache first per the
/// TTL policy, falling back to the network, and finally to a stale
/// on-disk copy in degraded mode if every network source fails.
pub async fn fetch_year(
    client: &reqwest::Client,
    mirrors: &[String],
    canonical_raw_url: &str,
    cache_dir: &Path,
    year: i32,
    today: NaiveDate,
    timeout: Duration,
) -> Option<Value> {
    let path = cache_path(cache_dir, year);

    if is_cache_valid(&path, year, today.year()) {
        if let Some(value) = read_cache(&path) {
            return Some(value);
        }
    }

    let urls = build_urls(mirrors, canonical_raw_url, year);
    if let Some(value) = try_network(client, &urls, timeout).await {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if let Ok(serialized) = serde_json::to_string(&value) {
            if let Err(e) = crate::atomic::write_atomic_str(&path, &serialized) {
                tracing::warn!(year, error = %e, "failed to persist holiday year cache");
            }
        }
        return Some(value);
    }

    tracing::warn!(year, "all holiday sources failed, falling back to degraded on-disk cache");
    read_cache(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_urls_places_canonical_last() {
        let mirrors = vec!["https://mirror-a".to_string(), "https://mirror-b".to_string()];
        let urls = build_urls(&mirrors, "https://raw.githubusercontent.com/x", 2026);
        assert_eq!(
            urls,
            vec![
                "https://mirror-a/2026.json".to_string(),
                "https://mirror-b/2026.json".to_string(),
                "https://raw.githubusercontent.com/x/2026.json".to_string(),
            ]
        );
    }

    #[test]
    fn past_year_ttl_is_permanent() {
        assert!(matches!(ttl_for(2024, 2026), Ttl::Permanent));
    }

    #[test]
    fn current_year_ttl_is_seven_days() {
        match ttl_for(2026, 2026) {
            Ttl::Bounded(d) => assert_eq!(d, Duration::from_secs(7 * 24 * 3600)),
            _ => panic!("expected bounded ttl"),
        }
    }

    #[test]
    fn future_year_ttl_is_twelve_hours() {
        match ttl_for(2027, 2026) {
            Ttl::Bounded(d) => assert_eq!(d, Duration::from_secs(12 * 3600)),
            _ => panic!("expected bounded ttl"),
        }
    }

    #[tokio::test]
    async fn degraded_mode_reads_stale_cache_when_network_fails() {
        let dir = tempfile::tempdir().unwrap();
        // A future year carries a 12h ttl; back-date the file past it so
        // the cache is expired and the (failing) network path is exercised.
        let year = 2027;
        let path = cache_path(dir.path(), year);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"days": []}"#).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(13 * 3600)).unwrap();

        let client = reqwest::Client::new();
        let result = fetch_year(
            &client,
            &["http://10.255.255.1/mirror".to_string()],
            "http://10.255.255.1/canonical",
            dir.path(),
            year,
            NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, Some(serde_json::json!({"days": []})));
    }
}
