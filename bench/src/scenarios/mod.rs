//! Benchmark scenarios with representative node counts and task loads.
//!
//! - **Scene tree**: a random node graph with shared assets and short-lived
//!   nodes, driven through full runtime frames
//! - **Task fan-out**: many small tasks per frame, each frame ending on a fence

mod memory_loader;
pub mod scene_tree;
pub mod task_fanout;

pub use memory_loader::{MemoryInstance, MemoryLoader};
pub use scene_tree::{SceneTreeConfig, SceneTreeScenario, flag_random, random_project};
pub use task_fanout::{TaskFanoutConfig, TaskFanoutScenario};

/// Common trait for benchmark scenarios.
pub trait Scenario {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Live nodes, or queued work for scenarios without a scene.
    fn size(&self) -> usize;

    fn setup(&mut self);

    /// Run one frame.
    fn update(&mut self);

    fn teardown(&mut self);
}
