//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MarqueeSettings::default()`]
//! 2. If `~/.marquee/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `MARQUEE_*` environment variable overrides

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::MarqueeSettings;

/// Resolve the path to the settings file (`~/.marquee/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".marquee").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MarqueeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MarqueeSettings> {
    let defaults = serde_json::to_value(MarqueeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MarqueeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and
/// `null` in `source` keeps the target value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `MARQUEE_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut MarqueeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

    if let Some(v) = read_string(lookup, "MARQUEE_CHROME_PATH") {
        settings.browser.executable = Some(v);
    }
    if let Some(v) = read_parsed(lookup, "MARQUEE_HEADLESS", parse_bool) {
        settings.browser.headless = v;
    }
    if let Some(v) = read_parsed(lookup, "MARQUEE_TIMEOUT_MS", |v| parse_u64_range(v, 1, 3_600_000)) {
        settings.discovery.default_timeout_ms = v;
    }
    if let Some(v) = read_parsed(lookup, "MARQUEE_READY_POLL_MS", |v| parse_u64_range(v, 1, 10_000)) {
        settings.discovery.ready_poll_interval_ms = v;
    }
    if let Some(v) = read_parsed(lookup, "MARQUEE_INJECT_RETRIES", |v| {
        v.parse::<u32>().ok().filter(|n| *n <= 10)
    }) {
        settings.discovery.injection_retries = v;
    }
    if let Some(v) = read_string(lookup, "MARQUEE_SERVER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_parsed(lookup, "MARQUEE_SERVER_PORT", |v| v.parse::<u16>().ok()) {
        settings.server.port = v;
    }
}

fn read_string(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

fn read_parsed<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read_string(lookup, name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
