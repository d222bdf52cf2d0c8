//! Resolved topology: config validated and flattened for runtime use.

use crate::config::{validate, RouterConfig};
use crate::error::ConfigError;
use crate::handle::DatabaseHandle;
use crate::routing::RoutingState;
use regex::Regex;

#[derive(Clone, Debug)]
pub struct StateOverride {
    pub pattern: Regex,
    pub state: RoutingState,
}

#[derive(Clone, Debug)]
pub struct Topology {
    pub primary: DatabaseHandle,
    pub replicas: Vec<DatabaseHandle>,
    pub overrides: Vec<StateOverride>,
}

impl Topology {
    /// State forced by the first override whose pattern matches `path`.
    pub fn override_for_path(&self, path: &str) -> Option<RoutingState> {
        self.overrides
            .iter()
            .find(|o| o.pattern.is_match(path))
            .map(|o| o.state)
    }

    pub fn handles(&self) -> impl Iterator<Item = &DatabaseHandle> {
        std::iter::once(&self.primary).chain(self.replicas.iter())
    }
}

/// Build the runtime topology from config (validates first).
pub fn resolve(config: &RouterConfig) -> Result<Topology, ConfigError> {
    validate(config)?;
    let overrides = config
        .state_overrides
        .iter()
        .map(|o| {
            Regex::new(&o.path_pattern)
                .map(|pattern| StateOverride { pattern, state: o.state })
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: o.path_pattern.clone(),
                    reason: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Topology {
        primary: DatabaseHandle::primary(config.primary.name.clone()),
        replicas: config
            .replicas
            .iter()
            .map(|r| DatabaseHandle::replica(r.name.clone()))
            .collect(),
        overrides,
    })
}
