//! KFC / "Crazy Thursday" adapter, grounded in
//! `original_source/app/services/kfc.py`. The Thursday gate is a decorator
//! over the fetch closure (spec §9 Design Notes), not a distinct adapter
//! type: on any non-Thursday business day the upstream is never called.

use chrono::{Datelike, NaiveDate, Weekday};
use serde_json::Value;
use std::time::Duration;

fn extract_kfc_text(body: &Value) -> Option<String> {
    if let Some(s) = body.as_str() {
        return Some(s.to_string());
    }
    if let Some(data) = body.get("data") {
        if let Some(s) = data.as_str() {
            return Some(s.to_string());
        }
        if let Some(s) = data.get("kfc").and_then(Value::as_str) {
            return Some(s.to_string());
        }
    }
    if let Some(s) = body.get("text").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    None
}

fn normalize(raw: &str) -> String {
    raw.replace("\\n", "\n").trim().to_string()
}

pub async fn fetch_fresh(
    client: &reqwest::Client,
    url: &str,
    business_date: NaiveDate,
    timeout: Duration,
) -> Option<Value> {
    if business_date.weekday() != Weekday::Thu {
        return None;
    }
    super::fetch_with_timeout(timeout, async {
        let resp = client.get(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: Value = resp.json().await.ok()?;
        extract_kfc_text(&body).map(|s| Value::String(normalize(&s)))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_on_weekday() {
        let thursday = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        assert_eq!(thursday.weekday(), Weekday::Thu);
        let wednesday = NaiveDate::from_ymd_opt(2026, 7, 29).unwrap();
        assert_eq!(wednesday.weekday(), Weekday::Wed);
    }

    #[test]
    fn extracts_nested_data_kfc_shape() {
        let body = serde_json::json!({"data": {"kfc": "疯狂星期四\\n恰巧今天"}});
        assert_eq!(extract_kfc_text(&body).map(|s| normalize(&s)), Some("疯狂星期四\n恰巧今天".to_string()));
    }

    #[test]
    fn extracts_bare_string_shape() {
        let body = Value::String("v我50".to_string());
        assert_eq!(extract_kfc_text(&body), Some("v我50".to_string()));
    }

    #[test]
    fn extracts_data_string_shape() {
        let body = serde_json::json!({"data": "疯狂星期四"});
        assert_eq!(extract_kfc_text(&body), Some("疯狂星期四".to_string()));
    }

    #[test]
    fn extracts_text_shape() {
        let body = serde_json::json!({"text": "疯狂星期四"});
        assert_eq!(extract_kfc_text(&body), Some("疯狂星期四".to_string()));
    }

    #[tokio::test]
    async fn non_thursday_skips_request_entirely() {
        let client = reqwest::Client::new();
        let wednesday = NaiveDate::from_ymd_opt(2026, 7, 29).unwrap();
        let result = fetch_fresh(&client, "http://10.255.255.1/kfc", wednesday, Duration::from_secs(5)).await;
        assert_eq!(result, None);
    }
}
