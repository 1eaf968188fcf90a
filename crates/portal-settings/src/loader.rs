//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PortalSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `PORTAL_*` environment variable overrides
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::PortalSettings;

/// Resolve the path to the settings file (`~/.portal/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".portal").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PortalSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields the defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PortalSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<PortalSettings> {
    let defaults = serde_json::to_value(PortalSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment variable overrides to loaded settings.
///
/// Values that fail to parse or fall outside their range are ignored
/// with a warning.
pub fn apply_env_overrides(settings: &mut PortalSettings) {
    if let Some(v) = read_env_string("PORTAL_URL") {
        settings.transport.base_url = v;
    }
    if let Some(v) = read_env_u64("PORTAL_RECONNECT_DELAY_MS", 10, 600_000) {
        settings.transport.reconnect_delay_ms = v;
    }
    if let Some(v) = read_env_u64("PORTAL_KEEP_ALIVE_MS", 100, 3_600_000) {
        settings.transport.keep_alive_interval_ms = v;
    }
    if let Some(v) = read_env_u64("PORTAL_MAX_INACTIVITY_MS", 0, 86_400_000) {
        settings.transport.max_inactivity_ms = v;
    }
    if let Some(v) = read_env_u64("PORTAL_SCRIPT_TIMEOUT_MS", 0, 3_600_000) {
        settings.resources.script_load_timeout_ms = v;
    }
    if let Some(v) = read_env_string("PORTAL_SESSION_FILE") {
        settings.session.storage_path = Some(PathBuf::from(v));
    }
    if let Some(v) = read_env_string("PORTAL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("PORTAL_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "transport": {"reconnectDelayMs": 1000, "baseUrl": "ws://a"}
        });
        let source = serde_json::json!({
            "transport": {"reconnectDelayMs": 250}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["transport"]["reconnectDelayMs"], 250);
        assert_eq!(merged["transport"]["baseUrl"], "ws://a");
    }

    #[test]
    fn merge_skips_null() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_replaces_arrays() {
        let merged = deep_merge(
            serde_json::json!({"a": [1, 2, 3]}),
            serde_json::json!({"a": [9]}),
        );
        assert_eq!(merged["a"], serde_json::json!([9]));
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_layered(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.transport.reconnect_delay_ms, 1_000);
    }

    #[test]
    fn partial_file_is_merged_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"transport": {"baseUrl": "wss://console.example/portal-session", "maxInactivityMs": 600000}}"#,
        )
        .unwrap();

        let settings = read_layered(&path).unwrap();
        assert_eq!(settings.transport.base_url, "wss://console.example/portal-session");
        assert_eq!(settings.transport.max_inactivity_ms, 600_000);
        assert_eq!(settings.transport.keep_alive_interval_ms, 60_000);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(read_layered(&path), Err(SettingsError::Json(_))));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("500", 10, 1000), Some(500));
        assert_eq!(parse_u64_range("5", 10, 1000), None);
        assert_eq!(parse_u64_range("abc", 0, 10), None);
    }
}
