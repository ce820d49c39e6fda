//! State store (C8): versioned state file with v1→v2 migration on read
//! and atomic temp-file+rename on write, grounded in
//! `original_source/app/services/state.py::migrate_state`/`save_state`.

use crate::error::{AppError, ErrorCode, Result};
use chrono::{DateTime, FixedOffset};
use serde_json::{json, Map, Value};
use std::path::Path;

const LEGACY_TEMPLATE_NAME: &str = "moyuren";

const PUBLIC_FIELDS: [&str; 7] =
    ["date", "updated", "updated_at_ms", "weekday", "lunar_date", "fun_content", "is_crazy_thursday"];

/// Reads the state file at `path`, applying v1→v2 migration if needed. A
/// missing file is not an error: returns `None` so the caller treats it as
/// "nothing generated yet".
pub fn read(path: &Path) -> Result<Option<Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::with_source(
                ErrorCode::Storage4001ReadFailed,
                format!("failed to read state file {}", path.display()),
                e.into(),
            ))
        }
    };
    let doc: Value = serde_json::from_str(&raw).map_err(|e| {
        AppError::with_source(ErrorCode::Storage4002BadVersion, "state file is not valid JSON", e.into())
    })?;
    Ok(Some(migrate(doc)?))
}

/// Promotes a root-level legacy document (version missing or `1`) into v2
/// under `templates["moyuren"]`/`template_data["moyuren"]`, per spec §3/§4.8.
/// A document already at version 2 is returned unchanged; any other version
/// is rejected as `STORAGE_4002`.
fn migrate(doc: Value) -> Result<Value> {
    let version = doc.get("version").and_then(Value::as_i64).unwrap_or(1);
    match version {
        2 => Ok(doc),
        1 => Ok(migrate_v1(doc)),
        other => Err(AppError::new(
            ErrorCode::Storage4002BadVersion,
            format!("unsupported state file version {other}"),
        )),
    }
}

fn migrate_v1(doc: Value) -> Value {
    let Value::Object(root) = doc else {
        return empty_v2();
    };

    let mut public = Map::new();
    for field in PUBLIC_FIELDS {
        if let Some(v) = root.get(field) {
            public.insert(field.to_string(), v.clone());
        }
    }
    if let Some(kfc) = root.get("kfc_content") {
        public.insert("kfc_content".to_string(), kfc.clone());
    }

    let mut template_entry = Map::new();
    if let Some(filename) = root.get("filename") {
        template_entry.insert("filename".to_string(), filename.clone());
    }
    if let Some(updated) = root.get("updated") {
        template_entry.insert("updated".to_string(), updated.clone());
    } else if let Some(timestamp) = root.get("timestamp") {
        // Legacy documents stamped the render time as `timestamp` rather
        // than `updated`; carry it across under the v2 field name.
        public.insert("updated".to_string(), timestamp.clone());
        template_entry.insert("updated".to_string(), timestamp.clone());
    }
    if let Some(updated_at_ms) = root.get("updated_at_ms") {
        template_entry.insert("updated_at_ms".to_string(), updated_at_ms.clone());
    }

    let mut templates = Map::new();
    templates.insert(LEGACY_TEMPLATE_NAME.to_string(), Value::Object(template_entry));

    let mut template_data = Map::new();
    template_data.insert(LEGACY_TEMPLATE_NAME.to_string(), Value::Object(root.clone()));

    let mut out = Map::new();
    out.insert("version".to_string(), json!(2));
    out.insert("public".to_string(), Value::Object(public));
    out.insert("templates".to_string(), Value::Object(templates));
    out.insert("template_data".to_string(), Value::Object(template_data));
    flatten_compat_fields(&mut out, LEGACY_TEMPLATE_NAME);

    // Preserve any root-level legacy fields not otherwise accounted for
    // (e.g. `filename`) verbatim, matching scenario 4's "root filename
    // preserved verbatim" expectation.
    for (key, value) in root {
        out.entry(key).or_insert(value);
    }

    Value::Object(out)
}

fn empty_v2() -> Value {
    json!({"version": 2, "public": {}, "templates": {}, "template_data": {}})
}

/// Flattens `public` and `templates[active]` onto the document root for
/// backward-compatible readers (spec §3/§4.8 step 3).
fn flatten_compat_fields(doc: &mut Map<String, Value>, active_template: &str) {
    if let Some(Value::Object(public)) = doc.get("public").cloned() {
        for (k, v) in public {
            doc.insert(k, v);
        }
    }
    if let Some(entry) = doc
        .get("templates")
        .and_then(|t| t.get(active_template))
        .and_then(Value::as_object)
        .cloned()
    {
        for (k, v) in entry {
            doc.insert(k, v);
        }
    }
}

/// Composes the document the render pipeline will persist for a single
/// generation, overwriting only `active_template`'s entries and leaving any
/// other template untouched (spec §4.8 steps 1-2). `now` MUST be in
/// `display_tz` (spec §9: "display timestamps in the state file use
/// display_tz"), not business time or UTC.
pub fn build_write(
    existing: Option<Value>,
    active_template: &str,
    date: &str,
    lunar_date: &str,
    weekday: &str,
    fun_content: Option<&Value>,
    is_crazy_thursday: bool,
    kfc_content: Option<&str>,
    filename: &str,
    template_context: &Value,
    now: DateTime<FixedOffset>,
) -> Value {
    let mut doc = match existing {
        Some(doc) => match doc {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        None => Map::new(),
    };
    doc.insert("version".to_string(), json!(2));

    let updated_at_ms = now.timestamp_millis();
    let updated = now.to_rfc3339();

    let mut public = doc
        .get("public")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    public.insert("date".to_string(), json!(date));
    public.insert("updated".to_string(), json!(updated));
    public.insert("updated_at_ms".to_string(), json!(updated_at_ms));
    public.insert("weekday".to_string(), json!(weekday));
    public.insert("lunar_date".to_string(), json!(lunar_date));
    public.insert("is_crazy_thursday".to_string(), json!(is_crazy_thursday));
    if let Some(fc) = fun_content {
        public.insert("fun_content".to_string(), fc.clone());
    }
    if let Some(kfc) = kfc_content {
        public.insert("kfc_content".to_string(), json!(kfc));
    }
    doc.insert("public".to_string(), Value::Object(public));

    let mut templates = doc
        .get("templates")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    templates.insert(
        active_template.to_string(),
        json!({"filename": filename, "updated": updated, "updated_at_ms": updated_at_ms}),
    );
    doc.insert("templates".to_string(), Value::Object(templates));

    let mut template_data = doc
        .get("template_data")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    template_data.insert(active_template.to_string(), template_context.clone());
    doc.insert("template_data".to_string(), Value::Object(template_data));

    flatten_compat_fields(&mut doc, active_template);

    Value::Object(doc)
}

/// Writes `doc` to `path` via the shared atomic-write helper.
pub fn write(path: &Path, doc: &Value) -> Result<()> {
    let contents = serde_json::to_string_pretty(doc).map_err(|e| {
        AppError::with_source(ErrorCode::Storage4003WriteFailed, "failed to serialise state document", e.into())
    })?;
    crate::atomic::write_atomic_str(path, &contents).map_err(|e| {
        AppError::with_source(
            ErrorCode::Storage4003WriteFailed,
            format!("failed to write state file {}", path.display()),
            e.into(),
        )
    })
}

/// `updated_at` (ms since epoch) of `active_template`'s entry, used by the
/// orchestrator's 10-second double-check recheck (spec §4.9).
pub fn template_updated_at_ms(doc: &Value, active_template: &str) -> Option<i64> {
    doc.get("templates")?.get(active_template)?.get("updated_at_ms")?.as_i64()
}

pub fn template_filename(doc: &Value, active_template: &str) -> Option<String> {
    doc.get("templates")?.get(active_template)?.get("filename")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600).unwrap().with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        assert!(read(&path).unwrap().is_none());
    }

    #[test]
    fn v2_document_passes_through_unchanged() {
        let doc = json!({"version": 2, "public": {"date": "2026-07-28"}, "templates": {}, "template_data": {}});
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        let read_back = read(&path).unwrap().unwrap();
        assert_eq!(read_back["public"]["date"], "2026-07-28");
    }

    #[test]
    fn v1_document_migrates_into_moyuren_template() {
        let v1 = json!({
            "date": "2026-02-04",
            "timestamp": "2026-02-04T10:00:00+08:00",
            "filename": "moyuren_20260204_100000.jpg",
            "weekday": "星期三"
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, serde_json::to_string(&v1).unwrap()).unwrap();
        let migrated = read(&path).unwrap().unwrap();
        assert_eq!(migrated["version"], 2);
        assert_eq!(migrated["templates"]["moyuren"]["filename"], "moyuren_20260204_100000.jpg");
        assert_eq!(migrated["public"]["updated"], "2026-02-04T10:00:00+08:00");
        assert_eq!(migrated["filename"], "moyuren_20260204_100000.jpg");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let doc = json!({"version": 3});
        assert!(migrate(doc).is_err());
    }

    #[test]
    fn write_overwrites_only_active_template() {
        let existing = json!({
            "version": 2,
            "public": {},
            "templates": {"other": {"filename": "other_20260101_000000.jpg", "updated": "x", "updated_at_ms": 1}},
            "template_data": {"other": {}}
        });
        let ctx = json!({"date": {"day": 28}});
        let doc = build_write(
            Some(existing),
            "moyuren",
            "2026-07-28",
            "六月初四",
            "星期二",
            None,
            false,
            None,
            "moyuren_20260728_100000.jpg",
            &ctx,
            test_now(),
        );
        assert_eq!(doc["templates"]["other"]["filename"], "other_20260101_000000.jpg");
        assert_eq!(doc["templates"]["moyuren"]["filename"], "moyuren_20260728_100000.jpg");
        assert_eq!(doc["filename"], "moyuren_20260728_100000.jpg");
    }

    #[test]
    fn round_trips_through_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let ctx = json!({"date": {"day": 28}});
        let doc = build_write(None, "moyuren", "2026-07-28", "六月初四", "星期二", None, false, None, "moyuren_x.jpg", &ctx, test_now());
        write(&path, &doc).unwrap();
        let read_back = read(&path).unwrap().unwrap();
        assert_eq!(template_filename(&read_back, "moyuren").as_deref(), Some("moyuren_x.jpg"));
        assert!(template_updated_at_ms(&read_back, "moyuren").is_some());
    }
}
