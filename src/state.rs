//! Shared application state: the router and the pools it routes between.

use crate::config::RouterConfig;
use crate::error::AppError;
use crate::middleware::{PinSettings, Pinning};
use crate::pools::{DatabasePools, PgProbe};
use crate::router::{DatabaseRouter, ReplicaRouter};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ReplicaRouter>,
    pub pools: DatabasePools,
    pub pin: Arc<PinSettings>,
}

impl AppState {
    /// Lazily connected pools and a router probing through them.
    pub fn from_config(config: &RouterConfig, max_connections: u32) -> Result<Self, AppError> {
        let pools = DatabasePools::connect_lazy(config, max_connections)?;
        let router = ReplicaRouter::from_config(config, Arc::new(PgProbe::new(pools.clone())))?;
        Ok(AppState {
            router: Arc::new(router),
            pools,
            pin: Arc::new(PinSettings::from_config(config)),
        })
    }

    /// Middleware state sharing this router.
    pub fn pinning(&self) -> Pinning {
        Pinning {
            router: self.router.clone(),
            settings: self.pin.clone(),
        }
    }

    /// Pool serving reads of `entity` under the current routing state.
    pub async fn pool_for_read(&self, entity: &str) -> Result<PgPool, AppError> {
        let handle = self.router.handle_for_read(entity).await;
        self.pools
            .get(&handle)
            .cloned()
            .ok_or_else(|| AppError::Unavailable(format!("no pool for database '{}'", handle)))
    }

    /// Pool of the primary; marks the request as having written.
    pub fn pool_for_write(&self, entity: &str) -> Result<PgPool, AppError> {
        let handle = self.router.handle_for_write(entity);
        self.pools
            .get(&handle)
            .cloned()
            .ok_or_else(|| AppError::Unavailable(format!("no pool for database '{}'", handle)))
    }
}
