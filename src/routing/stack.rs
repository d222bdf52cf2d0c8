//! Per-request LIFO stack of routing states.

use crate::handle::DatabaseHandle;
use crate::routing::RoutingState;

#[derive(Clone, Debug)]
struct Frame {
    activation: u64,
    requested: RoutingState,
    effective: RoutingState,
    /// Pushed while overrides were disabled; reads share the replica of the frame below.
    inherited: bool,
    /// Replica serving reads for this activation, picked on first read.
    choice: Option<DatabaseHandle>,
}

/// Stack of routing states for one request or task. Never shared between requests.
///
/// An empty stack reports [`RoutingState::Master`].
#[derive(Debug, Default)]
pub struct RoutingStack {
    frames: Vec<Frame>,
    next_activation: u64,
    wrote: bool,
}

impl RoutingStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `state` and return the activation id of the new frame.
    ///
    /// With overrides disabled the frame is still recorded, so depth stays balanced for the
    /// matching pop, but it keeps reporting the state that was active below it and reads through
    /// it use the replica memoized on that lower frame.
    pub fn push(&mut self, state: RoutingState, overrides_enabled: bool) -> u64 {
        let activation = self.next_activation;
        self.next_activation += 1;
        let effective = if overrides_enabled { state } else { self.current() };
        self.frames.push(Frame {
            activation,
            requested: state,
            effective,
            inherited: !overrides_enabled,
            choice: None,
        });
        activation
    }

    /// Pop the top frame. Underflow is a no-op that returns `None`.
    pub fn pop(&mut self) -> Option<RoutingState> {
        match self.frames.pop() {
            Some(frame) => Some(frame.requested),
            None => {
                tracing::warn!("routing state revert without matching use_state; staying on master");
                None
            }
        }
    }

    /// Remove the frame for `activation`, wherever it sits. Used by guards dropped out of order.
    pub fn remove(&mut self, activation: u64) -> Option<RoutingState> {
        let pos = self.frames.iter().rposition(|f| f.activation == activation)?;
        if pos + 1 != self.frames.len() {
            tracing::warn!(activation, depth = self.frames.len(), "routing state released out of order");
        }
        Some(self.frames.remove(pos).requested)
    }

    pub fn current(&self) -> RoutingState {
        self.frames.last().map(|f| f.effective).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Activation id of the top frame.
    pub fn activation(&self) -> Option<u64> {
        self.frames.last().map(|f| f.activation)
    }

    /// Memoized replica for reads under the top frame.
    pub fn choice(&self) -> Option<&DatabaseHandle> {
        let top = self.frames.len().checked_sub(1)?;
        self.frames[self.owner(top)].choice.as_ref()
    }

    /// Memoize `handle` for reads under the frame for `activation` unless one was already chosen.
    /// Returns the handle in effect, or `None` if the frame is gone.
    pub fn set_choice(&mut self, activation: u64, handle: DatabaseHandle) -> Option<DatabaseHandle> {
        let pos = self.frames.iter().rposition(|f| f.activation == activation)?;
        let owner = self.owner(pos);
        Some(self.frames[owner].choice.get_or_insert(handle).clone())
    }

    /// Nearest frame at or below `pos` that was not inherited.
    fn owner(&self, mut pos: usize) -> usize {
        while pos > 0 && self.frames[pos].inherited {
            pos -= 1;
        }
        pos
    }

    pub fn mark_write(&mut self) {
        self.wrote = true;
    }

    /// Whether a write handle was handed out while this stack was active.
    pub fn wrote(&self) -> bool {
        self.wrote
    }
}
