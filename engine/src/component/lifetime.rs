use std::sync::Arc;

use log::debug;

use super::{Component, ComponentState, FrameContext, RuntimeContext};
use crate::error::Result;

/// Flags nodes for deletion once they outlive their `die_after`.
///
/// Runs as a single task per frame under a read lock on the scene; it only
/// raises delete flags and leaves removal to the sweep.
#[derive(Debug, Default)]
pub struct LifetimeComponent {
    state: ComponentState,
}

impl LifetimeComponent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for LifetimeComponent {
    fn name(&self) -> &str {
        "lifetime"
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn init(&mut self, _runtime: &RuntimeContext<'_>) -> Result<()> {
        Ok(())
    }

    fn push_tasks(&self, frame: &FrameContext<'_>) {
        let scene = Arc::clone(frame.scene);
        frame.tasks.push_fn("lifetime", move || {
            let scene = scene.read();
            let now = scene.time();
            let mut expired = 0;
            scene.apply_to_all(|_, node| {
                if !node.is_delete_flagged() && node.has_outlived(now) {
                    node.set_delete_flag(true);
                    expired += 1;
                }
            });
            if expired > 0 {
                debug!("{} node(s) reached the end of their lifetime", expired);
            }
            true
        });
    }
}
