//! Router façade consulted by the data layer for every read and write.

use crate::config::{resolve, RouterConfig, Topology};
use crate::error::ConfigError;
use crate::handle::DatabaseHandle;
use crate::liveness::{LivenessProber, Probe, ProbeSettings};
use crate::routing::{self, RoutingState, StateGuard};
use crate::selector::ReplicaSelector;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Picks the database handle for an operation on `entity` (a table or model name).
#[async_trait]
pub trait DatabaseRouter: Send + Sync {
    /// Always the primary.
    fn handle_for_write(&self, entity: &str) -> DatabaseHandle;

    /// Primary or a replica, depending on the current routing state.
    async fn handle_for_read(&self, entity: &str) -> DatabaseHandle;
}

/// Master/slave router with per-request state stack and liveness-aware replica choice.
///
/// Shared across requests behind an `Arc`. The routing stack itself lives in task-local storage
/// (see [`routing::scope`]); only the liveness cache and the overrides switch are shared.
pub struct ReplicaRouter {
    topology: Topology,
    selector: ReplicaSelector,
    overrides_enabled: AtomicBool,
}

impl ReplicaRouter {
    pub fn new(topology: Topology, prober: Arc<LivenessProber>) -> Self {
        let selector = ReplicaSelector::new(&topology, prober);
        ReplicaRouter {
            topology,
            selector,
            overrides_enabled: AtomicBool::new(true),
        }
    }

    /// Resolve `config` and build a router probing through `probe`.
    pub fn from_config(config: &RouterConfig, probe: Arc<dyn Probe>) -> Result<Self, ConfigError> {
        let topology = resolve(config)?;
        let prober = Arc::new(LivenessProber::new(probe, ProbeSettings::from_config(config)));
        Ok(Self::new(topology, prober))
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn primary(&self) -> &DatabaseHandle {
        &self.topology.primary
    }

    pub fn prober(&self) -> &Arc<LivenessProber> {
        self.selector.prober()
    }

    pub fn selector(&self) -> &ReplicaSelector {
        &self.selector
    }

    /// Push `state` for the current request; it is reverted when the guard drops.
    pub fn use_state(&self, state: RoutingState) -> StateGuard {
        let enabled = self.state_overrides_enabled();
        let activation = routing::with_stack(|s| s.push(state, enabled));
        if activation.is_none() {
            tracing::warn!(%state, "use_state outside a routing scope is ignored");
        }
        StateGuard::new(activation)
    }

    /// Pop the most recent state. Without a matching push this is a no-op.
    pub fn revert(&self) {
        routing::with_stack(|s| s.pop());
    }

    pub fn current_state(&self) -> RoutingState {
        routing::current_state()
    }

    /// Run `fut` with reads pinned to the primary. The state is reverted on every exit path.
    pub async fn with_primary<F: Future>(&self, fut: F) -> F::Output {
        self.with_state(RoutingState::Master, fut).await
    }

    /// Run `fut` with reads going to a replica.
    pub async fn with_replica<F: Future>(&self, fut: F) -> F::Output {
        self.with_state(RoutingState::Slave, fut).await
    }

    /// Closure form of [`ReplicaRouter::with_primary`].
    pub async fn run_pinned_to_primary<F, Fut>(&self, f: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.with_primary(f()).await
    }

    async fn with_state<F: Future>(&self, state: RoutingState, fut: F) -> F::Output {
        if routing::in_scope() {
            let _guard = self.use_state(state);
            fut.await
        } else {
            routing::scope(async {
                let _guard = self.use_state(state);
                fut.await
            })
            .await
        }
    }

    /// Freeze reported routing states: later pushes are recorded but keep the state below them.
    pub fn disable_state_overrides(&self) {
        if self.overrides_enabled.swap(false, Ordering::SeqCst) {
            tracing::info!("routing state overrides disabled");
        }
    }

    pub fn enable_state_overrides(&self) {
        if !self.overrides_enabled.swap(true, Ordering::SeqCst) {
            tracing::info!("routing state overrides enabled");
        }
    }

    pub fn state_overrides_enabled(&self) -> bool {
        self.overrides_enabled.load(Ordering::SeqCst)
    }

    /// Whether the primary currently accepts writes (reachable and not in recovery).
    pub async fn is_primary_writable(&self) -> bool {
        self.prober().is_writable(&self.topology.primary).await
    }

    /// Whether a write handle was handed out in the current routing scope.
    pub fn wrote_in_scope(&self) -> bool {
        routing::with_stack(|s| s.wrote()).unwrap_or(false)
    }
}

#[async_trait]
impl DatabaseRouter for ReplicaRouter {
    fn handle_for_write(&self, entity: &str) -> DatabaseHandle {
        routing::with_stack(|s| s.mark_write());
        tracing::trace!(entity, database = %self.topology.primary, "write routed");
        self.topology.primary.clone()
    }

    async fn handle_for_read(&self, entity: &str) -> DatabaseHandle {
        let (state, activation, memo) = routing::with_stack(|s| (s.current(), s.activation(), s.choice().cloned()))
            .unwrap_or((RoutingState::Master, None, None));
        if state == RoutingState::Master {
            return self.topology.primary.clone();
        }
        if let Some(handle) = memo {
            return handle;
        }

        let chosen = self.selector.choose_read_handle(state).await;
        // another read in this activation may have chosen while we were probing
        let chosen = match activation {
            Some(a) => routing::with_stack(|s| s.set_choice(a, chosen.clone()))
                .flatten()
                .unwrap_or(chosen),
            None => chosen,
        };
        tracing::trace!(entity, database = %chosen, "read routed");
        chosen
    }
}
