//! Runtime core of the Dream engine.
//!
//! A [`ProjectRuntime`] owns a pool of task threads, one asset cache per asset
//! category and the active [`Scene`]. Every frame it creates and loads the
//! asset instances nodes reference, lets each enabled [`Component`] push work
//! onto the pool, waits for that work to finish and then sweeps nodes that
//! were flagged for deletion.

pub mod asset;
pub mod component;
pub mod config;
pub mod core;
pub mod error;
pub mod project;
pub mod scene;

pub use component::{Component, ComponentState, FrameContext, RuntimeContext};
pub use config::EngineConfig;
pub use self::core::tasks::{Task, TaskHandle, TaskManager};
pub use self::core::time::Time;
pub use error::{EngineError, Result};
pub use project::{FrameReport, ProjectDefinition, ProjectDirectory, ProjectRuntime};
pub use scene::{Event, NodeId, Scene, SceneNode};
