//! Load router config from a JSON file or from `REPLICATED_*` environment variables.

use crate::config::types::{DatabaseConfig, RouterConfig};
use crate::config::validate;
use crate::error::ConfigError;
use std::path::Path;
use std::str::FromStr;

/// Read and validate a JSON config file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<RouterConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let config = parse_json(&raw)?;
    tracing::debug!(path = %path.display(), replicas = config.replicas.len(), "loaded router config");
    Ok(config)
}

pub fn parse_json(raw: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = serde_json::from_str(raw).map_err(|e| ConfigError::Load(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Build config from the process environment (a `.env` file is honored).
pub fn from_env() -> Result<RouterConfig, ConfigError> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Same as [`from_env`] with an injectable lookup, so tests need not touch the process env.
pub fn from_lookup<F>(lookup: F) -> Result<RouterConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let primary_url = get("REPLICATED_PRIMARY_URL").ok_or(ConfigError::Missing("REPLICATED_PRIMARY_URL"))?;
    let primary = DatabaseConfig {
        name: get("REPLICATED_PRIMARY_NAME").unwrap_or_else(|| "default".into()),
        url: primary_url,
    };
    let replicas = get("REPLICATED_REPLICA_URLS")
        .map(|list| parse_replica_list(&list))
        .unwrap_or_default();

    let mut config = RouterConfig::new(primary, replicas);
    if let Some(name) = get("REPLICATED_PIN_COOKIE_NAME") {
        config.pin_cookie_name = name;
    }
    if let Some(v) = get("REPLICATED_PIN_WINDOW_SECONDS") {
        config.pin_window_seconds = parse_number("REPLICATED_PIN_WINDOW_SECONDS", &v)?;
    }
    if let Some(v) = get("REPLICATED_LIVENESS_TTL_SECONDS") {
        config.liveness_cache_ttl_seconds = parse_number("REPLICATED_LIVENESS_TTL_SECONDS", &v)?;
    }
    if let Some(v) = get("REPLICATED_PROBE_RETRIES") {
        config.liveness_probe_retries = parse_number("REPLICATED_PROBE_RETRIES", &v)?;
    }
    if let Some(v) = get("REPLICATED_PROBE_TIMEOUT_MS") {
        config.probe_timeout_ms = parse_number("REPLICATED_PROBE_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("REPLICATED_CHECK_PRIMARY_WRITABLE") {
        config.check_primary_writable = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
    }
    validate(&config)?;
    Ok(config)
}

/// Comma-separated list; each item is either `url` or `name=url`.
fn parse_replica_list(list: &str) -> Vec<DatabaseConfig> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, item)| match item.split_once('=') {
            // a bare url may itself contain '=' in its query string
            Some((name, url)) if !name.contains("://") => DatabaseConfig {
                name: name.trim().to_string(),
                url: url.trim().to_string(),
            },
            _ => DatabaseConfig {
                name: format!("replica_{}", i + 1),
                url: item.to_string(),
            },
        })
        .collect()
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
