//! Asset definitions, instances and the caches that connect them.

mod cache;
mod definition;
mod instance;
mod resource;

pub use cache::{AssetCaches, AssetLoader, Cache};
pub use definition::{AssetDefinition, AssetDefinitions, AssetType};
pub use instance::AssetInstance;
pub use resource::{ResourceInstance, ResourceLoader};

#[cfg(test)]
pub(crate) use cache::tests::{TestInstance, TestLoader};
