//! Scene graph, per-node asset state and the two-phase delete sweep.

mod event;
mod node;
#[allow(clippy::module_inception)]
mod scene;

pub use event::Event;
pub use node::{NodeId, NodeState, SceneNode};
pub use scene::{Scene, SceneState};
