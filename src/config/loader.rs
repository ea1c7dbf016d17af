//! Configuration loading and environment parsing.

use serde_json::Value;
use std::fs;
use std::path::Path;

use super::Config;

/// Load configuration with the following precedence (highest first):
/// 1) Well-known deployment variables (`SUPABASE_URL`, `SUPABASE_ANON_KEY`,
///    `CACHE_URL`, `CACHE_TOKEN`, `CORS_ORIGINS`, `DEBUG`, `PORT`,
///    `WS_HEARTBEAT_INTERVAL`, `WS_CONNECTION_TIMEOUT`, `AUTH_TIMEOUT`)
/// 2) Nested overrides with prefix `LUDO_STACKED__` and `__` as separator,
///    e.g. `LUDO_STACKED__LOGGING__FORMAT=json`
/// 3) File pointed at by `LUDO_STACKED_CONFIG_PATH`
/// 4) `config.json` in the current working directory
/// 5) Defaults compiled into the binary
///
/// Errors while reading or parsing any source are printed to stderr and
/// that source is skipped; `load()` always returns a `Config`.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    if let Ok(path) = env::var("LUDO_STACKED_CONFIG_PATH") {
        merge_file_source(&mut merged, &PathBuf::from(path));
    } else {
        merge_file_source(&mut merged, &PathBuf::from("config.json"));
    }

    apply_env_overrides(&mut merged);
    apply_well_known_env(&mut merged);

    match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => merge_values(target, value),
            Err(err) => eprintln!("Failed to parse config from {}: {}", path.display(), err),
        },
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("LUDO_STACKED__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        set_nested_value(root, &segments, parse_scalar(raw_value.trim()));
    }
}

/// The short, documented deployment variables override everything else.
fn apply_well_known_env(root: &mut Value) {
    let mappings: [(&str, &[&str]); 10] = [
        ("PORT", &["port"]),
        ("CORS_ORIGINS", &["cors_origins"]),
        ("DEBUG", &["debug"]),
        ("SUPABASE_URL", &["identity", "url"]),
        ("SUPABASE_ANON_KEY", &["identity", "anon_key"]),
        ("CACHE_URL", &["cache", "url"]),
        ("CACHE_TOKEN", &["cache", "token"]),
        (
            "WS_HEARTBEAT_INTERVAL",
            &["websocket", "heartbeat_interval_secs"],
        ),
        (
            "WS_CONNECTION_TIMEOUT",
            &["websocket", "connection_timeout_secs"],
        ),
        ("AUTH_TIMEOUT", &["websocket", "auth_timeout_secs"]),
    ];

    for (var, path) in mappings {
        if let Ok(raw) = std::env::var(var) {
            let segments: Vec<String> = path.iter().map(|s| (*s).to_string()).collect();
            let value = if matches!(var, "SUPABASE_URL" | "SUPABASE_ANON_KEY" | "CACHE_URL" | "CACHE_TOKEN" | "CORS_ORIGINS")
            {
                // Always strings, even when they would parse as numbers.
                Value::String(raw.trim().to_string())
            } else {
                parse_scalar(raw.trim())
            };
            set_nested_value(root, &segments, value);
        }
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        *target = value;
        return;
    }

    if segments.len() == 1 {
        let map = ensure_object(target);
        // SAFETY: Length is checked to be exactly 1 on the line above.
        #[allow(clippy::indexing_slicing)]
        map.insert(segments[0].clone(), value);
        return;
    }

    let map = ensure_object(target);
    // SAFETY: segments.len() > 1 (len 0 and len 1 are handled above), so
    // index 0 and the [1..] slice are both in bounds.
    #[allow(clippy::indexing_slicing)]
    let key = segments[0].clone();
    let entry = map
        .entry(key)
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    #[allow(clippy::indexing_slicing)]
    let rest = &segments[1..];
    set_nested_value(entry, rest, value);
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    // SAFETY: The branch above guarantees `value` is a `Value::Object`, so
    // `as_object_mut()` will always return `Some`.
    #[allow(clippy::expect_used)]
    value
        .as_object_mut()
        .expect("value should be coerced into an object")
}
