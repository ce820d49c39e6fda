//! Source adapters (C3): one per upstream. Each returns a typed payload or
//! `None` — transport failures are classified as `None`, never propagated,
//! per spec §4.3 and §7.

pub mod fun_content;
pub mod holiday_source;
pub mod kfc;
pub mod news;
pub mod stock_index;

use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Runs `fut` with a bounded timeout, collapsing both a timeout and a
/// fetch-level `None` into `None` — adapters never escalate transport
/// failures to the orchestrator (spec §4.3).
pub async fn fetch_with_timeout<Fut>(timeout: Duration, fut: Fut) -> Option<Value>
where
    Fut: Future<Output = Option<Value>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(v) => v,
        Err(_) => None,
    }
}
