//! State Manager: state entry and readiness.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use crate::domain::{PhaseKind, Readiness, State};
use crate::ports::{Clock, IdGenerator};

use super::hooks::{AggregationHook, AlignmentHook, DemultiplexHook, FingerprintHook, StateHook};

pub struct StateManager {
    hooks: HashMap<PhaseKind, Arc<dyn StateHook>>,
    clock: Arc<dyn Clock>,
}

impl StateManager {
    /// No hooks: entering any state only stamps it.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            hooks: HashMap::new(),
            clock,
        }
    }

    pub fn with_default_hooks(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self::new(clock)
            .with_hook(DemultiplexHook)
            .with_hook(AlignmentHook::new(ids.clone()))
            .with_hook(AggregationHook::new(ids))
            .with_hook(FingerprintHook)
    }

    /// Installs `hook` for its phase, replacing any previous one.
    pub fn with_hook<H: StateHook + 'static>(mut self, hook: H) -> Self {
        self.hooks.insert(hook.phase(), Arc::new(hook));
        self
    }

    /// Runs the phase's hook, then stamps queued times on the state's tasks.
    ///
    /// Returns `false` if the hook failed; the cause is logged and the state
    /// is left un-entered so the caller can retry.
    pub fn on_enter(&self, state: &mut State) -> bool {
        if let Some(hook) = self.hooks.get(&state.phase().kind()) {
            if let Err(err) = hook.on_enter(state) {
                error!(state = %state.name(), phase = %state.phase().kind(), error = %err, "failed to enter state");
                return false;
            }
        }
        let now = self.clock.now();
        state.stamp_queued(now);
        state.mark_entered(now);
        info!(state = %state.name(), tasks = state.all_tasks().count(), "state entered");
        true
    }

    pub fn readiness(&self, state: &State) -> Readiness {
        state.readiness()
    }
}
