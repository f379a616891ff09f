//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StreamingSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `RELAY_STREAM_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{RenderSurface, StreamingSettings};

/// Resolve the settings file path.
///
/// `RELAY_SETTINGS_PATH` wins; otherwise `~/.relay/streaming.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os("RELAY_SETTINGS_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("streaming.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<StreamingSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<StreamingSettings> {
    let mut settings = read_settings_file(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<StreamingSettings> {
    let defaults = serde_json::to_value(StreamingSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading streaming settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_owned(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
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

/// Apply overrides read through `lookup` (normally the process environment).
///
/// Invalid values are logged and ignored, falling back to file/default.
pub fn apply_overrides(settings: &mut StreamingSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(raw) = read("RELAY_STREAM_ENABLED") {
        match parse_bool(&raw) {
            Some(v) => settings.enabled = v,
            None => warn_invalid("RELAY_STREAM_ENABLED", &raw),
        }
    }
    if let Some(raw) = read("RELAY_STREAM_THROTTLE_MS") {
        match parse_u64_range(&raw, 50, 10_000) {
            Some(v) => settings.throttle_ms = v,
            None => warn_invalid("RELAY_STREAM_THROTTLE_MS", &raw),
        }
    }
    if let Some(raw) = read("RELAY_STREAM_SURFACE") {
        match RenderSurface::parse(&raw) {
            Some(v) => settings.render_surface = v,
            None => warn_invalid("RELAY_STREAM_SURFACE", &raw),
        }
    }
    if let Some(raw) = read("RELAY_STREAM_EAGER_PLACEHOLDER") {
        match parse_bool(&raw) {
            Some(v) => settings.eager_placeholder = v,
            None => warn_invalid("RELAY_STREAM_EAGER_PLACEHOLDER", &raw),
        }
    }
    if let Some(raw) = read("RELAY_STREAM_PLACEHOLDER") {
        settings.placeholder_text = raw;
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid settings env var, ignoring");
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"filter": {"minLengthRatio": 0.85, "rotationStreak": 2}});
        let source = serde_json::json!({"filter": {"rotationStreak": 3}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["filter"]["rotationStreak"], 3);
        assert_eq!(merged["filter"]["minLengthRatio"], 0.85);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streaming.json");
        std::fs::write(
            &path,
            r#"{"throttleMs": 300, "retry": {"element": {"maxAttempts": 4}}}"#,
        )
        .unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.throttle_ms, 300);
        assert_eq!(settings.retry.element.max_attempts, 4);
        assert_eq!(settings.retry.element.base_delay_ms, 250);
        assert_eq!(settings.retry.sequenced.max_attempts, 8);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = read_settings_file(Path::new("/nonexistent/streaming.json")).unwrap();
        assert_eq!(settings.throttle_ms, StreamingSettings::default().throttle_ms);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streaming.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            read_settings_file(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_rejects_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streaming.json");
        std::fs::write(&path, r#"{"filter": {"minLengthRatio": 2.0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = StreamingSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("RELAY_STREAM_ENABLED", "off"),
                ("RELAY_STREAM_THROTTLE_MS", "750"),
                ("RELAY_STREAM_SURFACE", "plain"),
                ("RELAY_STREAM_EAGER_PLACEHOLDER", "yes"),
                ("RELAY_STREAM_PLACEHOLDER", "Thinking…"),
            ]),
        );
        assert!(!settings.enabled);
        assert_eq!(settings.throttle_ms, 750);
        assert_eq!(settings.render_surface, RenderSurface::Plain);
        assert!(settings.eager_placeholder);
        assert_eq!(settings.placeholder_text, "Thinking…");
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = StreamingSettings::default();
        apply_overrides(
            &mut settings,
            env(&[
                ("RELAY_STREAM_ENABLED", "maybe"),
                ("RELAY_STREAM_THROTTLE_MS", "5"),
                ("RELAY_STREAM_SURFACE", "hologram"),
                ("RELAY_STREAM_PLACEHOLDER", ""),
            ]),
        );
        let defaults = StreamingSettings::default();
        assert_eq!(settings.enabled, defaults.enabled);
        assert_eq!(settings.throttle_ms, defaults.throttle_ms);
        assert_eq!(settings.render_surface, defaults.render_surface);
        assert_eq!(settings.placeholder_text, defaults.placeholder_text);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("50", 50, 100), Some(50));
        assert_eq!(parse_u64_range("100", 50, 100), Some(100));
        assert_eq!(parse_u64_range("101", 50, 100), None);
        assert_eq!(parse_u64_range("-1", 50, 100), None);
    }
}
