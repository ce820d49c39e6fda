//! Fun-content adapter, grounded in
//! `original_source/app/services/fun_content.py`. Endpoints are tried in a
//! date-seeded shuffled order; the first to yield a non-empty string at its
//! configured dot-path wins.

use crate::config::FunContentEndpoint;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TITLE: &str = "🐟 摸鱼小贴士";
const DEFAULT_CONTENT: &str = "保持微笑，摸鱼一时爽，一直摸鱼一直爽。";

/// Deterministically shuffles `endpoints` using a seed derived from `date`
/// (`YYYYMMDD` as an integer), mirroring
/// `random.Random(int(date.strftime("%Y%m%d")))` in the original service.
pub fn shuffle_by_date(endpoints: &[FunContentEndpoint], date: NaiveDate) -> Vec<&FunContentEndpoint> {
    let seed: u64 = date.format("%Y%m%d").to_string().parse().unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ordered: Vec<&FunContentEndpoint> = endpoints.iter().collect();
    ordered.shuffle(&mut rng);
    ordered
}

/// Dot-path traversal into a JSON value, e.g. `"data.tip"` reaches
/// `value["data"]["tip"]`.
pub fn extract_by_path(value: &Value, path: &str) -> Option<String> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    current.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

async fn fetch_endpoint(
    client: &reqwest::Client,
    endpoint: &FunContentEndpoint,
    timeout: Duration,
) -> Option<String> {
    super::fetch_with_timeout(timeout, async {
        let resp = client.get(&endpoint.url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<Value>().await.ok()
    })
    .await
    .and_then(|body| extract_by_path(&body, &endpoint.data_path))
}

pub async fn fetch_fresh(
    client: &reqwest::Client,
    endpoints: &[FunContentEndpoint],
    date: NaiveDate,
    timeout: Duration,
) -> Option<Value> {
    for endpoint in shuffle_by_date(endpoints, date) {
        if let Some(content) = fetch_endpoint(client, endpoint, timeout).await {
            return Some(serde_json::json!({
                "title": endpoint.display_title,
                "content": content,
            }));
        }
    }
    Some(serde_json::json!({
        "title": DEFAULT_TITLE,
        "content": DEFAULT_CONTENT,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_is_deterministic_for_same_date() {
        let endpoints = vec![
            FunContentEndpoint { name: "a".into(), url: "u1".into(), data_path: "d".into(), display_title: "A".into() },
            FunContentEndpoint { name: "b".into(), url: "u2".into(), data_path: "d".into(), display_title: "B".into() },
            FunContentEndpoint { name: "c".into(), url: "u3".into(), data_path: "d".into(), display_title: "C".into() },
        ];
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let first: Vec<_> = shuffle_by_date(&endpoints, date).iter().map(|e| e.name.clone()).collect();
        let second: Vec<_> = shuffle_by_date(&endpoints, date).iter().map(|e| e.name.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn extract_by_path_walks_nested_objects() {
        let v = serde_json::json!({"data": {"tip": "hello"}});
        assert_eq!(extract_by_path(&v, "data.tip"), Some("hello".to_string()));
        assert_eq!(extract_by_path(&v, "data.missing"), None);
    }

    #[test]
    fn extract_by_path_rejects_empty_string() {
        let v = serde_json::json!({"data": {"tip": ""}});
        assert_eq!(extract_by_path(&v, "data.tip"), None);
    }

    #[tokio::test]
    async fn falls_back_to_default_when_all_endpoints_fail() {
        let client = reqwest::Client::new();
        let endpoints = vec![FunContentEndpoint {
            name: "a".into(),
            url: "http://10.255.255.1/fun".into(),
            data_path: "d".into(),
            display_title: "A".into(),
        }];
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let result = fetch_fresh(&client, &endpoints, date, Duration::from_millis(1)).await;
        assert_eq!(result, Some(serde_json::json!({"title": DEFAULT_TITLE, "content": DEFAULT_CONTENT})));
    }
}
