//! Generation orchestrator (C9) — the system's control core. Single-flights
//! the pipeline across both an in-process mutex and a cross-process
//! advisory file-lock, then runs fetch→compute→render→state update and
//! fires off a detached cache cleanup, grounded in
//! `original_source/app/services/generator.py::generate_and_save_image`.

use crate::cleanup;
use crate::compute;
use crate::context::AppContext;
use crate::error::{AppError, Result};
use crate::fetch;
use crate::render::{self, RenderOptions, ScreenshotEngine};
use crate::state;
use chrono::Weekday;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MEM_LOCK_TIMEOUT: Duration = Duration::from_millis(100);
const FILE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_LOCK_POLL: Duration = Duration::from_millis(50);
const RECHECK_WINDOW_MS: i64 = 10_000;

fn lock_path(state_path: &Path) -> PathBuf {
    state_path.parent().unwrap_or_else(|| Path::new(".")).join(".generation.lock")
}

/// Runs one full generation pass for `template_name` (or the configured
/// default) and returns the published filename. Implements the state
/// machine of spec §4.9: `acquiring_mem_lock → acquiring_file_lock →
/// recheck → fetching → computing → rendering → publishing →
/// {done_ok, done_skip, failed, busy}`.
pub async fn generate<E: ScreenshotEngine>(
    app: &AppContext,
    engine: &E,
    template_name: Option<&str>,
) -> Result<String> {
    let mem_guard = tokio::time::timeout(MEM_LOCK_TIMEOUT, app.generation_lock.lock())
        .await
        .map_err(|_| AppError::busy())?;

    let state_path = Path::new(&app.config.paths.state_path);
    let file_lock = crate::lock::FileLock::acquire_with_timeout(&lock_path(state_path), FILE_LOCK_TIMEOUT, FILE_LOCK_POLL)
        .await
        .map_err(|_| AppError::busy())?;

    let resolved = app.config.templates.get_template(template_name)?;
    let active_template = resolved.item.name.clone();

    // Double-check: another process may have just finished this template.
    if let Some(existing) = state::read(state_path)? {
        let fresh = state::template_updated_at_ms(&existing, &active_template)
            .map(|updated_at_ms| chrono::Utc::now().timestamp_millis() - updated_at_ms < RECHECK_WINDOW_MS)
            .unwrap_or(false);
        if fresh {
            if let Some(filename) = state::template_filename(&existing, &active_template) {
                drop(file_lock);
                drop(mem_guard);
                return Ok(filename);
            }
        }
    }

    let fetch_result = fetch::fetch_all(app, false).await;
    let ctx = compute::build_context(&app.clock, &fetch_result, resolved.item.show_kfc, resolved.item.show_stock);

    let now = app.clock.display_now();
    let template_path = Path::new(&resolved.item.path);
    let static_dir = Path::new(&app.config.paths.static_dir);
    let options = RenderOptions {
        width: resolved.item.viewport.width,
        height: resolved.item.viewport.height,
        device_scale_factor: resolved.device_scale_factor,
        jpeg_quality: resolved.jpeg_quality,
    };

    let filename = render::render(engine, template_path, static_dir, &active_template, &ctx, options, now).await?;

    let today = app.clock.business_today();
    let is_crazy_thursday = today.weekday() == Weekday::Thu;
    let existing = state::read(state_path)?;
    let doc = state::build_write(
        existing,
        &active_template,
        &today.format("%Y-%m-%d").to_string(),
        ctx["date"]["lunar_date"].as_str().unwrap_or_default(),
        ctx["date"]["week_cn"].as_str().unwrap_or_default(),
        fetch_result.fun_content.as_ref(),
        is_crazy_thursday,
        ctx.get("kfc_content").and_then(|v| v.as_str()),
        &filename,
        &ctx,
        now,
    );
    state::write(state_path, &doc)?;

    schedule_cleanup(app, today);

    drop(file_lock);
    drop(mem_guard);
    Ok(filename)
}

/// Fires a detached cleanup pass; its failures are logged only (spec §4.9).
fn schedule_cleanup(app: &AppContext, today: chrono::NaiveDate) {
    let cache_dir = PathBuf::from(&app.config.paths.cache_dir);
    let retain_days = app.config.cache.retain_days;
    tokio::spawn(async move {
        let summary = tokio::task::spawn_blocking(move || cleanup::run(&cache_dir, today, retain_days)).await;
        match summary {
            Ok(summary) => {
                tracing::info!(
                    deleted = summary.deleted_files,
                    freed_bytes = summary.freed_bytes,
                    "cache cleanup completed"
                );
            }
            Err(e) => tracing::warn!(error = %e, "cache cleanup task panicked"),
        }
    });
}
