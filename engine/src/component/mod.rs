//! Subsystems that contribute work to each frame.
//!
//! A [`Component`] is initialised once and then asked to push its tasks every
//! frame. It never holds on to the runtime: the pieces it needs are passed in
//! through [`RuntimeContext`] and [`FrameContext`] on each call.
//!
//! Ordering between components is the runtime's job. Tasks pushed by different
//! components may run in any order within a frame; everything pushed in a
//! frame has finished before that frame's delete sweep.

mod lifetime;

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::asset::AssetDefinitions;
use crate::config::EngineConfig;
use crate::core::tasks::TaskManager;
use crate::core::time::Time;
use crate::error::Result;
use crate::project::ProjectDefinition;
use crate::scene::Scene;

pub use lifetime::LifetimeComponent;

/// What a component sees during [`Component::init`].
pub struct RuntimeContext<'a> {
    pub config: &'a EngineConfig,
    pub project: &'a ProjectDefinition,
    pub definitions: &'a AssetDefinitions,
}

/// What a component sees during [`Component::push_tasks`].
pub struct FrameContext<'a> {
    pub time: Time,
    pub tasks: &'a TaskManager,
    pub scene: &'a Arc<RwLock<Scene>>,
}

#[derive(Debug, Clone, Copy)]
struct Flags {
    enabled: bool,
    initialised: bool,
}

/// Lock-guarded flags shared between a component and its running tasks.
#[derive(Debug)]
pub struct ComponentState {
    flags: RwLock<Flags>,
}

impl ComponentState {
    pub fn new() -> Self {
        Self {
            flags: RwLock::new(Flags {
                enabled: true,
                initialised: false,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.read().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.flags.write().enabled = enabled;
    }

    pub fn is_initialised(&self) -> bool {
        self.flags.read().initialised
    }

    pub(crate) fn set_initialised(&self, initialised: bool) {
        self.flags.write().initialised = initialised;
    }

    /// Hold the flags steady while reading several of them.
    pub fn lock(&self) -> ComponentStateGuard<'_> {
        ComponentStateGuard {
            flags: self.flags.read(),
        }
    }
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent view of a [`ComponentState`].
pub struct ComponentStateGuard<'a> {
    flags: RwLockReadGuard<'a, Flags>,
}

impl ComponentStateGuard<'_> {
    pub fn is_enabled(&self) -> bool {
        self.flags.enabled
    }

    pub fn is_initialised(&self) -> bool {
        self.flags.initialised
    }
}

/// A subsystem driven by the runtime once per frame.
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> &ComponentState;

    /// One-time setup. An error here stops the runtime from starting.
    fn init(&mut self, runtime: &RuntimeContext<'_>) -> Result<()>;

    /// Build this frame's tasks and push them. Must not block.
    fn push_tasks(&self, frame: &FrameContext<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_defaults() {
        let state = ComponentState::default();
        assert!(state.is_enabled());
        assert!(!state.is_initialised());
    }

    #[test]
    fn test_guard_sees_consistent_flags() {
        let state = ComponentState::new();
        state.set_enabled(false);
        state.set_initialised(true);
        let guard = state.lock();
        assert!(!guard.is_enabled());
        assert!(guard.is_initialised());
    }
}
