//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TutorSettings::default()`]
//! 2. If `~/.tutor/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TUTOR_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{tutor_home, GenerationBackend, TutorSettings};

/// Resolve the path to the settings file (`~/.tutor/settings.json`).
pub fn settings_path() -> PathBuf {
    tutor_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TutorSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TutorSettings> {
    let defaults = serde_json::to_value(TutorSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TutorSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
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
/// Invalid values are ignored with a warning and the file/default value stays.
pub fn apply_env_overrides(settings: &mut TutorSettings) {
    if let Some(v) = read_env_string("TUTOR_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("TUTOR_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("TUTOR_DB") {
        settings.server.database_path = v;
    }
    if let Some(v) = read_env_string("TUTOR_MODEL") {
        settings.generation.model = v;
    }
    if let Some(v) = read_env_string("TUTOR_GENERATION_BACKEND") {
        match parse_backend(&v) {
            Some(backend) => settings.generation.backend = backend,
            None => tracing::warn!(key = "TUTOR_GENERATION_BACKEND", value = %v, "unknown backend, ignoring"),
        }
    }
    if let Some(v) = read_env_u64("TUTOR_GENERATION_TIMEOUT_MS", 1000, 3_600_000) {
        settings.generation.timeout_ms = v;
    }
    if let Some(v) = read_env_string("TUTOR_ENDPOINT") {
        settings.generation.endpoint = v;
    }
    if let Some(v) = read_env_string("TUTOR_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn validate(settings: &TutorSettings) -> Result<()> {
    if settings.generation.timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "generation.timeoutMs must be positive".into(),
        ));
    }
    if settings.transcript.summary_preview_chars == 0 {
        return Err(SettingsError::InvalidValue(
            "transcript.summaryPreviewChars must be positive".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a backend name (`mlx` or `chat_completions`, case-insensitive).
pub fn parse_backend(val: &str) -> Option<GenerationBackend> {
    match val.to_lowercase().as_str() {
        "mlx" => Some(GenerationBackend::Mlx),
        "chat_completions" | "openai" => Some(GenerationBackend::ChatCompletions),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
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

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
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

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tutor-settings-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 3001, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let path = temp_path("absent.json");
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.generation.max_tokens, 1000);
    }

    #[test]
    fn file_values_override_defaults() {
        let path = temp_path("settings.json");
        std::fs::write(
            &path,
            r#"{"generation": {"backend": "chat_completions", "maxTokens": 256}, "transcript": {"title": "AWS Notes"}}"#,
        )
        .unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.generation.backend, GenerationBackend::ChatCompletions);
        assert_eq!(settings.generation.max_tokens, 256);
        assert_eq!(settings.generation.timeout_ms, 60_000);
        assert_eq!(settings.transcript.title, "AWS Notes");
    }

    #[test]
    fn invalid_json_is_error() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn zero_preview_budget_rejected() {
        let path = temp_path("zero.json");
        std::fs::write(&path, r#"{"transcript": {"summaryPreviewChars": 0}}"#).unwrap();
        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::InvalidValue(_))));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_backend_names() {
        assert_eq!(parse_backend("MLX"), Some(GenerationBackend::Mlx));
        assert_eq!(parse_backend("chat_completions"), Some(GenerationBackend::ChatCompletions));
        assert_eq!(parse_backend("openai"), Some(GenerationBackend::ChatCompletions));
        assert_eq!(parse_backend("gpt"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("3001", 1, 65535), Some(3001));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
        assert_eq!(parse_u64_range("500", 1000, 10_000), None);
        assert_eq!(parse_u64_range("5000", 1000, 10_000), Some(5000));
    }
}
