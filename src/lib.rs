//! Replica router: master/slave read routing for PostgreSQL with post-write pinning.
//!
//! Writes always go to the primary. Reads follow the routing state on top of a per-request
//! stack: the primary under `Master`, a live replica under `Slave`. The [`middleware::pin_writes`]
//! middleware picks the initial state per request and pins a client to the primary for a short
//! window after it wrote.

pub mod config;
pub mod error;
pub mod handle;
pub mod handlers;
pub mod liveness;
pub mod middleware;
pub mod pools;
pub mod response;
pub mod router;
pub mod routes;
pub mod routing;
pub mod selector;
pub mod state;

pub use config::{from_env, load_from_path, resolve, RouterConfig, Topology};
pub use error::{AppError, ConfigError, ProbeError};
pub use handle::{DatabaseHandle, Role};
pub use liveness::{CheckKind, LivenessProber, LivenessRecord, Probe, ProbeSettings};
pub use middleware::{pin_writes, reject_writes_when_read_only, with_pinning, PerformedWrite, PinSettings, Pinning};
pub use pools::{DatabasePools, PgProbe};
pub use response::success_one_ok;
pub use router::{DatabaseRouter, ReplicaRouter};
pub use routes::{admin_routes, common_routes_with_ready};
pub use routing::{current_state as current_routing_state, RoutingState, StateGuard};
pub use selector::ReplicaSelector;
pub use state::AppState;
