//! News adapter, grounded in
//! `original_source/app/services/fetcher.py::DataFetcher.fetch`. The
//! response body is opaque JSON — it is destructured later by the context
//! computer (C6), not here.

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub async fn fetch_fresh(
    client: &reqwest::Client,
    url: &str,
    params: &BTreeMap<String, String>,
    timeout: Duration,
) -> Option<Value> {
    super::fetch_with_timeout(timeout, async {
        let resp = client.get(url).query(params).send().await.ok()?;
        if !resp.status().is_success() {
            tracing::warn!(url, status = %resp.status(), "news adapter received non-2xx response");
            return None;
        }
        resp.json::<Value>().await.ok()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_yields_none() {
        let client = reqwest::Client::new();
        let params = BTreeMap::new();
        // A non-routable address reliably exceeds a near-zero timeout.
        let result = fetch_fresh(&client, "http://10.255.255.1/news", &params, Duration::from_millis(1)).await;
        assert!(result.is_none());
    }
}
