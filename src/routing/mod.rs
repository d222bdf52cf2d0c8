//! Routing state stack, scoped per request or task.

mod context;
mod stack;
mod state;

pub use context::{current_state, in_scope, scope, sync_scope, StateGuard};
pub(crate) use context::with_stack;
pub use stack::RoutingStack;
pub use state::RoutingState;
