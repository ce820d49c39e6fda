//! Renderer contract (C7), grounded in
//! `original_source/app/services/renderer.py`: render the HTML template
//! against the context, screenshot it, and atomically publish the JPEG.
//! The headless-browser step is an external collaborator behind the
//! [`ScreenshotEngine`] trait — this module owns only the filename
//! convention, the atomic publish, and error classification.

use crate::error::{AppError, ErrorCode, Result};
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Narrow contract the orchestrator depends on instead of a concrete
/// browser implementation. Native `async fn` in a trait (no `async-trait`
/// needed).
pub trait ScreenshotEngine {
    async fn capture(
        &self,
        html: &str,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        jpeg_quality: u8,
    ) -> Result<Vec<u8>>;
}

fn placeholder_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}").unwrap())
}

fn lookup_path<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitutes `{{dot.path}}` placeholders in `template_source` with values
/// looked up in `ctx`; missing paths render as an empty string. The actual
/// template source text and its layout are an external collaborator (spec
/// §1) — this is the narrow substitution contract the renderer needs to
/// turn a context into HTML before handing it to the screenshot engine.
pub fn render_template(template_source: &str, ctx: &Value) -> String {
    placeholder_pattern()
        .replace_all(template_source, |caps: &regex::Captures| {
            lookup_path(ctx, &caps[1]).map(value_to_display).unwrap_or_default()
        })
        .into_owned()
}

fn generate_filename(template_name: &str, at: DateTime<FixedOffset>) -> String {
    format!("{template_name}_{}.jpg", at.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub jpeg_quality: u8,
}

/// Renders `template_name` against `ctx`, screenshots it via `engine`, and
/// atomically publishes the JPEG into `static_dir`. Returns the published
/// filename per spec §4.7.
pub async fn render<E: ScreenshotEngine>(
    engine: &E,
    template_path: &Path,
    static_dir: &Path,
    template_name: &str,
    ctx: &Value,
    options: RenderOptions,
    now: DateTime<FixedOffset>,
) -> Result<String> {
    let source = std::fs::read_to_string(template_path).map_err(|e| {
        AppError::with_source(
            ErrorCode::Render3001Template,
            format!("failed to read template {}", template_path.display()),
            e.into(),
        )
    })?;
    let html = render_template(&source, ctx);

    let bytes = engine
        .capture(&html, options.width, options.height, options.device_scale_factor, options.jpeg_quality)
        .await
        .map_err(|e| AppError::new(ErrorCode::Render3002Screenshot, e.to_string()))?;

    let filename = generate_filename(template_name, now);
    let target: PathBuf = static_dir.join(&filename);
    crate::atomic::write_atomic(&target, &bytes).map_err(|e| {
        AppError::with_source(ErrorCode::Render3003Save, format!("failed to publish {}", target.display()), e.into())
    })?;

    Ok(filename)
}
