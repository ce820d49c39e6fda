//! Declarative configuration schema (C14), loaded from YAML and validated
//! once at startup. Mirrors the shape of
//! `original_source/app/core/config.py`'s pydantic models, re-expressed as
//! `serde`-derived structs with explicit post-deserialisation validation in
//! place of pydantic's field/model validators.

use crate::clock;
use crate::error::{AppError, ErrorCode, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub base_domain: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub cache_dir: String,
    pub static_dir: String,
    pub state_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerMode {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub mode: SchedulerMode,
    #[serde(default)]
    pub daily_times: Vec<String>,
    pub minute_of_hour: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_retain_days")]
    pub retain_days: i64,
}

fn default_retain_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpsConfig {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunContentEndpoint {
    pub name: String,
    pub url: String,
    pub data_path: String,
    pub display_title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSourceConfig {
    News {
        #[serde(default = "default_enabled")]
        enabled: bool,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        url: String,
        #[serde(default)]
        params: std::collections::BTreeMap<String, String>,
    },
    FunContent {
        #[serde(default = "default_enabled")]
        enabled: bool,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        endpoints: Vec<FunContentEndpoint>,
    },
    CrazyThursday {
        #[serde(default = "default_enabled")]
        enabled: bool,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        url: String,
    },
    Holiday {
        #[serde(default = "default_enabled")]
        enabled: bool,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        #[serde(default)]
        mirrors: Vec<String>,
        canonical_raw_url: String,
    },
    StockIndex {
        #[serde(default = "default_enabled")]
        enabled: bool,
        #[serde(default = "default_timeout_sec")]
        timeout_sec: u64,
        quote_url: String,
        #[serde(default = "default_stock_ttl")]
        cache_ttl_sec: u64,
    },
}

fn default_enabled() -> bool {
    true
}
fn default_timeout_sec() -> u64 {
    10
}
fn default_stock_ttl() -> u64 {
    60
}

impl DataSourceConfig {
    pub fn enabled(&self) -> bool {
        match self {
            DataSourceConfig::News { enabled, .. }
            | DataSourceConfig::FunContent { enabled, .. }
            | DataSourceConfig::CrazyThursday { enabled, .. }
            | DataSourceConfig::Holiday { enabled, .. }
            | DataSourceConfig::StockIndex { enabled, .. } => *enabled,
        }
    }

    pub fn timeout_sec(&self) -> u64 {
        match self {
            DataSourceConfig::News { timeout_sec, .. }
            | DataSourceConfig::FunContent { timeout_sec, .. }
            | DataSourceConfig::CrazyThursday { timeout_sec, .. }
            | DataSourceConfig::Holiday { timeout_sec, .. }
            | DataSourceConfig::StockIndex { timeout_sec, .. } => *timeout_sec,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateRenderConfig {
    #[serde(default = "default_device_scale_factor")]
    pub device_scale_factor: f64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub use_china_cdn: bool,
}

fn default_device_scale_factor() -> f64 {
    2.0
}
fn default_jpeg_quality() -> u8 {
    90
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateItemConfig {
    pub name: String,
    pub path: String,
    pub viewport: ViewportConfig,
    pub device_scale_factor: Option<f64>,
    pub jpeg_quality: Option<u8>,
    #[serde(default)]
    pub show_kfc: bool,
    #[serde(default)]
    pub show_stock: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    pub default: Option<String>,
    pub config: TemplateRenderConfig,
    pub items: Vec<TemplateItemConfig>,
}

/// Resolved render parameters for a single template: item overrides win,
/// otherwise the process-wide default applies (spec §3 Template entity).
pub struct ResolvedTemplate<'a> {
    pub item: &'a TemplateItemConfig,
    pub device_scale_factor: f64,
    pub jpeg_quality: u8,
}

impl TemplatesConfig {
    pub fn get_template(&self, name: Option<&str>) -> Result<ResolvedTemplate<'_>> {
        let target = name
            .map(str::to_string)
            .or_else(|| self.default.clone())
            .ok_or_else(|| {
                AppError::new(
                    ErrorCode::Config1001MissingField,
                    "no template name given and no default template configured",
                )
            })?;
        let item = self
            .items
            .iter()
            .find(|t| t.name == target)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCode::Config1002InvalidValue,
                    format!("unknown template \"{target}\""),
                )
            })?;
        Ok(ResolvedTemplate {
            item,
            device_scale_factor: item.device_scale_factor.unwrap_or(self.config.device_scale_factor),
            jpeg_quality: item.jpeg_quality.unwrap_or(self.config.jpeg_quality),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimezoneConfig {
    pub business: String,
    pub display: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub ops: OpsConfig,
    pub data_sources: Vec<DataSourceConfig>,
    pub templates: TemplatesConfig,
    pub timezone: TimezoneConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            retain_days: default_retain_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

fn template_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

fn hhmm_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").unwrap())
}

impl AppConfig {
    /// Loads YAML from `path`, overlays secrets from the environment, then
    /// validates. Matches `AppConfig.from_yaml`/`load_config` in the original
    /// service, minus the pydantic machinery.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::with_source(
                ErrorCode::Config1003Unreadable,
                format!("failed to read config file {}", path.display()),
                e.into(),
            )
        })?;
        let mut config: AppConfig = serde_yaml::from_str(&raw).map_err(|e| {
            AppError::with_source(
                ErrorCode::Config1002InvalidValue,
                "failed to parse config YAML",
                e.into(),
            )
        })?;
        if let Ok(api_key) = std::env::var("MOYUREN_API_KEY") {
            config.ops.api_key = api_key;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.scheduler.mode {
            SchedulerMode::Daily => {
                if self.scheduler.daily_times.is_empty() {
                    return Err(AppError::new(
                        ErrorCode::Config1001MissingField,
                        "scheduler.daily_times must be non-empty when mode=daily",
                    ));
                }
                for t in &self.scheduler.daily_times {
                    if !hhmm_pattern().is_match(t) {
                        return Err(AppError::new(
                            ErrorCode::Config1002InvalidValue,
                            format!("invalid daily_times entry \"{t}\", expected HH:MM"),
                        ));
                    }
                }
            }
            SchedulerMode::Hourly => {
                let minute = self.scheduler.minute_of_hour.ok_or_else(|| {
                    AppError::new(
                        ErrorCode::Config1001MissingField,
                        "scheduler.minute_of_hour is required when mode=hourly",
                    )
                })?;
                if minute > 59 {
                    return Err(AppError::new(
                        ErrorCode::Config1002InvalidValue,
                        format!("scheduler.minute_of_hour {minute} out of range [0, 59]"),
                    ));
                }
            }
        }

        if self.cache.retain_days <= 0 {
            return Err(AppError::new(
                ErrorCode::Config1002InvalidValue,
                "cache.retain_days must be > 0",
            ));
        }

        if self.templates.config.jpeg_quality == 0 || self.templates.config.jpeg_quality > 100 {
            return Err(AppError::new(
                ErrorCode::Config1002InvalidValue,
                "templates.config.jpeg_quality must be in [1, 100]",
            ));
        }

        let mut seen_names = std::collections::HashSet::new();
        for item in &self.templates.items {
            if !template_name_pattern().is_match(&item.name) {
                return Err(AppError::new(
                    ErrorCode::Config1002InvalidValue,
                    format!("template name \"{}\" must match ^[A-Za-z0-9_-]+$", item.name),
                ));
            }
            if !seen_names.insert(item.name.clone()) {
                return Err(AppError::new(
                    ErrorCode::Config1002InvalidValue,
                    format!("duplicate template name \"{}\"", item.name),
                ));
            }
            if item.viewport.width == 0 || item.viewport.height == 0 {
                return Err(AppError::new(
                    ErrorCode::Config1002InvalidValue,
                    format!("template \"{}\" viewport dimensions must be > 0", item.name),
                ));
            }
            if let Some(q) = item.jpeg_quality {
                if q == 0 || q > 100 {
                    return Err(AppError::new(
                        ErrorCode::Config1002InvalidValue,
                        format!("template \"{}\" jpeg_quality must be in [1, 100]", item.name),
                    ));
                }
            }
        }
        if let Some(default) = &self.templates.default {
            if !seen_names.contains(default) {
                return Err(AppError::new(
                    ErrorCode::Config1002InvalidValue,
                    format!("templates.default \"{default}\" is not among templates.items"),
                ));
            }
        }

        clock::parse_timezone(&self.timezone.business, false).map_err(|e| {
            AppError::new(
                ErrorCode::Config1002InvalidValue,
                format!("timezone.business invalid: {e}"),
            )
        })?;
        clock::parse_timezone(&self.timezone.display, true).map_err(|e| {
            AppError::new(
                ErrorCode::Config1002InvalidValue,
                format!("timezone.display invalid: {e}"),
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
server:
  host: "0.0.0.0"
  port: 8080
paths:
  cache_dir: "./cache"
  static_dir: "./static"
  state_path: "./state.json"
scheduler:
  mode: daily
  daily_times: ["06:00"]
cache:
  retain_days: 30
ops:
  api_key: "secret"
data_sources: []
templates:
  default: "moyuren"
  config:
    device_scale_factor: 2.0
    jpeg_quality: 90
    use_china_cdn: false
  items:
    - name: "moyuren"
      path: "./templates/moyuren.html"
      viewport: { width: 800, height: 1200 }
      show_kfc: true
      show_stock: true
timezone:
  business: "Asia/Shanghai"
  display: "local"
logging:
  level: "info"
  json: false
"#
    }

    #[test]
    fn parses_and_validates_minimal_config() {
        let config: AppConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.templates.items.len(), 1);
    }

    #[test]
    fn rejects_duplicate_template_names() {
        let mut config: AppConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        let dup = config.templates.items[0].clone();
        config.templates.items.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_local_business_timezone() {
        let mut config: AppConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.timezone.business = "local".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_daily_times_in_daily_mode() {
        let mut config: AppConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        config.scheduler.daily_times.clear();
        assert!(config.validate().is_err());
    }
}
