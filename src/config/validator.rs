//! Config validation. Runs once at load time so bad settings fail the process, not a request.

use crate::config::RouterConfig;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

pub fn validate(config: &RouterConfig) -> Result<(), ConfigError> {
    if config.primary.name.trim().is_empty() {
        return Err(ConfigError::Missing("primary.name"));
    }
    if config.primary.url.trim().is_empty() {
        return Err(ConfigError::Missing("primary.url"));
    }
    if config.replicas.is_empty() {
        return Err(ConfigError::Validation("at least one replica required".into()));
    }

    let mut names = HashSet::new();
    names.insert(config.primary.name.as_str());
    for r in &config.replicas {
        if r.name.trim().is_empty() {
            return Err(ConfigError::Missing("replicas[].name"));
        }
        if r.url.trim().is_empty() {
            return Err(ConfigError::Validation(format!("replica '{}' has no url", r.name)));
        }
        if !names.insert(r.name.as_str()) {
            return Err(ConfigError::DuplicateHandle(r.name.clone()));
        }
    }

    if config.pin_cookie_name.trim().is_empty() {
        return Err(ConfigError::Missing("pin_cookie_name"));
    }
    if config.pin_cookie_value.is_empty() || config.pin_cookie_value.contains([';', ',', ' ']) {
        return Err(ConfigError::Validation(
            "pin_cookie_value must be a non-empty cookie-safe token".into(),
        ));
    }
    if config.pin_window_seconds == 0 {
        return Err(ConfigError::Validation("pin_window_seconds must be positive".into()));
    }
    if config.liveness_probe_retries == 0 {
        return Err(ConfigError::Validation("liveness_probe_retries must be at least 1".into()));
    }
    if config.probe_timeout_ms == 0 {
        return Err(ConfigError::Validation("probe_timeout_ms must be positive".into()));
    }
    if let Some(header) = &config.force_state_header {
        if axum::http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!("invalid header name: {}", header)));
        }
    }

    for o in &config.state_overrides {
        Regex::new(&o.path_pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: o.path_pattern.clone(),
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, StateOverrideConfig};
    use crate::routing::RoutingState;

    fn db(name: &str) -> DatabaseConfig {
        DatabaseConfig {
            name: name.into(),
            url: format!("postgres://{}/app", name),
        }
    }

    fn base() -> RouterConfig {
        RouterConfig::new(db("default"), vec![db("r1"), db("r2")])
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn test_rejects_missing_primary_url() {
        let mut config = base();
        config.primary.url = "".into();
        assert!(matches!(validate(&config), Err(ConfigError::Missing("primary.url"))));
    }

    #[test]
    fn test_rejects_empty_replicas() {
        let mut config = base();
        config.replicas.clear();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_replica_named_like_primary() {
        let mut config = base();
        config.replicas.push(db("default"));
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateHandle(n)) if n == "default"));
    }

    #[test]
    fn test_rejects_zero_retries_and_window() {
        let mut config = base();
        config.liveness_probe_retries = 0;
        assert!(validate(&config).is_err());

        let mut config = base();
        config.pin_window_seconds = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_override_pattern() {
        let mut config = base();
        config.state_overrides.push(StateOverrideConfig {
            path_pattern: "(unclosed".into(),
            state: RoutingState::Slave,
        });
        assert!(matches!(validate(&config), Err(ConfigError::InvalidPattern { .. })));
    }
}
