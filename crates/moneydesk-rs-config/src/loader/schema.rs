//! Schema validation helpers for MoneyDesk JSON5 configuration.

use super::SchemaMode;
use crate::ConfigError;
use moneydesk_rs_protocol::Tier;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(
    value: &Value,
    _mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = [
        "$schema", "router", "kb", "quota", "ai", "storage", "server",
    ];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("router") {
        validate_router(value, layer, "router")?;
    }
    if let Some(value) = map.get("kb") {
        validate_kb(value, layer, "kb")?;
    }
    if let Some(value) = map.get("quota") {
        validate_quota(value, layer, "quota")?;
    }
    if let Some(value) = map.get("ai") {
        validate_ai(value, layer, "ai")?;
    }
    if let Some(value) = map.get("storage") {
        validate_storage(value, layer, "storage")?;
    }
    if let Some(value) = map.get("server") {
        validate_server(value, layer, "server")?;
    }

    Ok(())
}

/// Validate the "router" block.
fn validate_router(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "max_message_chars",
            "history_window",
            "history_max_chars",
            "canned_min_confidence",
            "additional_instructions",
        ],
        layer,
        path,
    )?;
    for key in ["max_message_chars", "history_window", "history_max_chars"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("canned_min_confidence") {
        expect_f64(value, layer, &join_path(path, "canned_min_confidence"))?;
    }
    if let Some(value) = map.get("additional_instructions") {
        expect_string(value, layer, &join_path(path, "additional_instructions"))?;
    }
    Ok(())
}

/// Validate the "kb" block.
fn validate_kb(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "corpus_path",
            "exact_threshold",
            "good_threshold",
            "partial_threshold",
            "shortcuts",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("corpus_path") {
        expect_string(value, layer, &join_path(path, "corpus_path"))?;
    }
    for key in ["exact_threshold", "good_threshold", "partial_threshold"] {
        if let Some(value) = map.get(key) {
            expect_f64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(shortcuts) = map.get("shortcuts") {
        let arr = expect_array(shortcuts, layer, &join_path(path, "shortcuts"))?;
        for (idx, entry) in arr.iter().enumerate() {
            validate_shortcut(entry, layer, &format!("{path}.shortcuts[{idx}]"))?;
        }
    }
    Ok(())
}

/// Validate a single KB shortcut rule.
fn validate_shortcut(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["pattern", "slug"], layer, path)?;
    for key in ["pattern", "slug"] {
        match map.get(key) {
            Some(value) => expect_string(value, layer, &join_path(path, key))?,
            None => return Err(invalid_field(layer, &join_path(path, key), "missing")),
        }
    }
    Ok(())
}

/// Validate the "quota" block.
fn validate_quota(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["chat_feature", "token_feature", "features"],
        layer,
        path,
    )?;
    for key in ["chat_feature", "token_feature"] {
        if let Some(value) = map.get(key) {
            expect_string(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(features) = map.get("features") {
        let features_path = join_path(path, "features");
        let features = expect_object(features, layer, &features_path)?;
        for (name, feature) in features {
            validate_feature(feature, layer, &join_path(&features_path, name))?;
        }
    }
    Ok(())
}

/// Validate one feature entry: a period and a tier-to-limit map.
fn validate_feature(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["period", "limits"], layer, path)?;
    if let Some(value) = map.get("period") {
        let period_path = join_path(path, "period");
        match value.as_str() {
            Some("daily" | "weekly" | "monthly") => {}
            Some(_) => {
                return Err(invalid_field(
                    layer,
                    &period_path,
                    "expected daily, weekly or monthly",
                ));
            }
            None => return Err(invalid_field(layer, &period_path, "expected string")),
        }
    }
    if let Some(limits) = map.get("limits") {
        let limits_path = join_path(path, "limits");
        let limits = expect_object(limits, layer, &limits_path)?;
        let tiers: Vec<&str> = Tier::ALL.iter().map(|tier| tier.as_str()).collect();
        ensure_allowed_keys(limits, &tiers, layer, &limits_path)?;
        for (tier, limit) in limits {
            let limit_path = join_path(&limits_path, tier);
            match limit.as_i64() {
                Some(limit) if limit >= -1 => {}
                Some(_) => {
                    return Err(invalid_field(layer, &limit_path, "expected -1 or more"));
                }
                None => return Err(invalid_field(layer, &limit_path, "expected integer")),
            }
        }
    }
    Ok(())
}

/// Validate the "ai" block.
fn validate_ai(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "base_url",
            "model",
            "api_key_env",
            "temperature",
            "max_tokens",
            "timeout_secs",
        ],
        layer,
        path,
    )?;
    for key in ["base_url", "model", "api_key_env"] {
        if let Some(value) = map.get(key) {
            expect_string(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("temperature") {
        expect_f64(value, layer, &join_path(path, "temperature"))?;
    }
    for key in ["max_tokens", "timeout_secs"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

/// Validate SQLite storage configuration.
fn validate_storage(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["path"], layer, path)?;
    if let Some(value) = map.get("path") {
        expect_string(value, layer, &join_path(path, "path"))?;
    }
    Ok(())
}

/// Validate HTTP listener configuration.
fn validate_server(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["address", "port"], layer, path)?;
    if let Some(value) = map.get("address") {
        expect_string(value, layer, &join_path(path, "address"))?;
    }
    if let Some(value) = map.get("port") {
        let port_path = join_path(path, "port");
        match value.as_u64() {
            Some(port) if port <= u64::from(u16::MAX) => {}
            _ => return Err(invalid_field(layer, &port_path, "expected port number")),
        }
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON array or return a typed error.
fn expect_array<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Vec<Value>, ConfigError> {
    match value {
        Value::Array(arr) => Ok(arr),
        _ => Err(invalid_field(layer, path, "expected array")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.as_str().is_some() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a non-negative JSON integer or return a typed error.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// Expect a JSON number or return a typed error.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_f64() || value.is_u64() || value.is_i64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid_field(layer, &join_path(path, key), "unknown key"));
        }
    }
    Ok(())
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
