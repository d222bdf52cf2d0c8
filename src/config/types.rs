//! Raw config types matching the JSON config file.

use crate::routing::RoutingState;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub url: String,
}

/// Forces a routing state for every request whose path matches `path_pattern` (a regex).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateOverrideConfig {
    pub path_pattern: String,
    pub state: RoutingState,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterConfig {
    pub primary: DatabaseConfig,
    #[serde(default)]
    pub replicas: Vec<DatabaseConfig>,
    #[serde(default = "default_pin_cookie_name")]
    pub pin_cookie_name: String,
    #[serde(default = "default_pin_cookie_value")]
    pub pin_cookie_value: String,
    #[serde(default = "default_pin_window_seconds")]
    pub pin_window_seconds: u64,
    #[serde(default = "default_liveness_cache_ttl_seconds")]
    pub liveness_cache_ttl_seconds: u64,
    #[serde(default = "default_liveness_probe_retries")]
    pub liveness_probe_retries: u32,
    /// Per-attempt probe timeout. Sits on the read path when the cache is cold, keep it short.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub host_identity: Option<String>,
    #[serde(default = "default_force_state_header")]
    pub force_state_header: Option<String>,
    #[serde(default)]
    pub state_overrides: Vec<StateOverrideConfig>,
    #[serde(default)]
    pub check_primary_writable: bool,
}

impl RouterConfig {
    /// Config with defaults for everything but the databases.
    pub fn new(primary: DatabaseConfig, replicas: Vec<DatabaseConfig>) -> Self {
        RouterConfig {
            primary,
            replicas,
            pin_cookie_name: default_pin_cookie_name(),
            pin_cookie_value: default_pin_cookie_value(),
            pin_window_seconds: default_pin_window_seconds(),
            liveness_cache_ttl_seconds: default_liveness_cache_ttl_seconds(),
            liveness_probe_retries: default_liveness_probe_retries(),
            probe_timeout_ms: default_probe_timeout_ms(),
            host_identity: None,
            force_state_header: default_force_state_header(),
            state_overrides: Vec::new(),
            check_primary_writable: false,
        }
    }

    /// First part of the liveness cache key. Falls back to `HOSTNAME`, then "localhost".
    pub fn host_identity(&self) -> String {
        self.host_identity
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "localhost".into())
    }
}

fn default_pin_cookie_name() -> String {
    "pin_writes".into()
}

fn default_pin_cookie_value() -> String {
    "y".into()
}

fn default_pin_window_seconds() -> u64 {
    15
}

fn default_liveness_cache_ttl_seconds() -> u64 {
    60
}

fn default_liveness_probe_retries() -> u32 {
    1
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_force_state_header() -> Option<String> {
    Some("X-Replicated-State".into())
}
