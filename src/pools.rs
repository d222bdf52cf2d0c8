//! PostgreSQL pools per database handle, and the probe that checks them.

use crate::config::{RouterConfig, Topology};
use crate::error::{ConfigError, ProbeError};
use crate::handle::DatabaseHandle;
use crate::liveness::{CheckKind, Probe};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// One lazily connected pool per configured handle.
#[derive(Clone, Debug)]
pub struct DatabasePools {
    by_name: HashMap<String, PgPool>,
}

impl DatabasePools {
    /// Build pools without connecting. Connections open on first use, so a replica that is down at
    /// startup does not keep the process from starting.
    pub fn connect_lazy(config: &RouterConfig, max_connections: u32) -> Result<Self, ConfigError> {
        let acquire_timeout = Duration::from_millis(config.probe_timeout_ms.max(1000));
        let mut by_name = HashMap::new();
        for db in std::iter::once(&config.primary).chain(config.replicas.iter()) {
            let options = PgConnectOptions::from_str(&db.url)
                .map_err(|e| ConfigError::Validation(format!("database '{}': {}", db.name, e)))?;
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect_lazy_with(options);
            by_name.insert(db.name.clone(), pool);
        }
        tracing::debug!(databases = by_name.len(), "database pools created");
        Ok(DatabasePools { by_name })
    }

    pub fn from_pools(pools: impl IntoIterator<Item = (String, PgPool)>) -> Self {
        DatabasePools {
            by_name: pools.into_iter().collect(),
        }
    }

    pub fn get(&self, handle: &DatabaseHandle) -> Option<&PgPool> {
        self.by_name.get(&handle.name)
    }

    /// Whether every handle in `topology` has a pool.
    pub fn covers(&self, topology: &Topology) -> bool {
        topology.handles().all(|h| self.by_name.contains_key(&h.name))
    }

    pub async fn close(&self) {
        for pool in self.by_name.values() {
            pool.close().await;
        }
    }
}

/// Probe backed by the handle's pool: `SELECT 1` for liveness, `pg_is_in_recovery()` for
/// writability.
#[derive(Clone, Debug)]
pub struct PgProbe {
    pools: DatabasePools,
}

impl PgProbe {
    pub fn new(pools: DatabasePools) -> Self {
        PgProbe { pools }
    }
}

#[async_trait]
impl Probe for PgProbe {
    async fn probe(&self, handle: &DatabaseHandle, kind: CheckKind) -> Result<(), ProbeError> {
        let pool = self
            .pools
            .get(handle)
            .ok_or_else(|| ProbeError::UnknownHandle(handle.name.clone()))?;
        match kind {
            CheckKind::Alive => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            CheckKind::Writable => {
                let in_recovery: bool = sqlx::query_scalar("SELECT pg_is_in_recovery()")
                    .fetch_one(pool)
                    .await?;
                if in_recovery {
                    Err(ProbeError::ReadOnly(handle.name.clone()))
                } else {
                    Ok(())
                }
            }
        }
    }
}
