//! Project descriptions, their on-disk layout and the runtime that plays them.

mod definition;
mod directory;
mod runtime;

pub use definition::{NodeDefinition, ProjectDefinition, SceneDefinition};
pub use directory::{PROJECT_FILE, ProjectDirectory};
pub use runtime::{FrameReport, ProjectRuntime};
