//! Task-local storage for the routing stack and the guard that pops it.
//!
//! Each request (or any future run through [`scope`]) gets its own [`RoutingStack`]. Code running
//! outside a scope sees [`RoutingState::Master`] and cannot change it.

use crate::routing::{RoutingStack, RoutingState};
use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static ROUTING_STACK: RefCell<RoutingStack>;
}

/// Run `fut` with a fresh, empty routing stack.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    ROUTING_STACK.scope(RefCell::new(RoutingStack::new()), fut).await
}

/// Blocking counterpart of [`scope`].
pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
    ROUTING_STACK.sync_scope(RefCell::new(RoutingStack::new()), f)
}

pub fn in_scope() -> bool {
    ROUTING_STACK.try_with(|_| ()).is_ok()
}

/// Apply `f` to the current task's stack; `None` outside a scope.
pub(crate) fn with_stack<R>(f: impl FnOnce(&mut RoutingStack) -> R) -> Option<R> {
    ROUTING_STACK.try_with(|cell| f(&mut cell.borrow_mut())).ok()
}

/// Top of the current stack, master when empty or outside a scope.
pub fn current_state() -> RoutingState {
    with_stack(|s| s.current()).unwrap_or_default()
}

/// Releases one routing state activation when dropped.
///
/// Returned by `ReplicaRouter::use_state`; hold it for as long as the state should apply.
#[must_use = "the routing state is reverted as soon as the guard is dropped"]
#[derive(Debug)]
pub struct StateGuard {
    activation: Option<u64>,
}

impl StateGuard {
    pub(crate) fn new(activation: Option<u64>) -> Self {
        StateGuard { activation }
    }

    /// Activation id, `None` when the push happened outside a scope.
    pub fn activation(&self) -> Option<u64> {
        self.activation
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        if let Some(activation) = self.activation.take() {
            let released = with_stack(|s| s.remove(activation)).flatten();
            if released.is_none() {
                tracing::debug!(activation, "routing state already reverted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outside_scope_reports_master() {
        assert!(!in_scope());
        assert_eq!(current_state(), RoutingState::Master);
        assert!(with_stack(|s| s.push(RoutingState::Slave, true)).is_none());
    }

    #[tokio::test]
    async fn test_guard_pops_on_drop() {
        scope(async {
            let activation = with_stack(|s| s.push(RoutingState::Slave, true));
            let guard = StateGuard::new(activation);
            assert_eq!(current_state(), RoutingState::Slave);
            drop(guard);
            assert_eq!(current_state(), RoutingState::Master);
            assert_eq!(with_stack(|s| s.depth()), Some(0));
        })
        .await;
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let a = tokio::spawn(scope(async {
            let _g = StateGuard::new(with_stack(|s| s.push(RoutingState::Slave, true)));
            tokio::task::yield_now().await;
            current_state()
        }));
        let b = tokio::spawn(scope(async {
            tokio::task::yield_now().await;
            current_state()
        }));
        assert_eq!(a.await.unwrap(), RoutingState::Slave);
        assert_eq!(b.await.unwrap(), RoutingState::Master);
    }

    #[test]
    fn test_guard_released_on_panic() {
        sync_scope(|| {
            let result = std::panic::catch_unwind(|| {
                let _g = StateGuard::new(with_stack(|s| s.push(RoutingState::Slave, true)));
                panic!("boom");
            });
            assert!(result.is_err());
            assert_eq!(current_state(), RoutingState::Master);
        });
    }
}
