use std::path::Path;

use uuid::Uuid;

use super::AssetType;
use crate::error::Result;

/// One concrete realization of an [`AssetDefinition`](super::AssetDefinition).
///
/// Instances are produced by a cache's loader and handed to scene nodes as
/// `Arc<dyn AssetInstance>`. Loading happens through `&self`, so
/// implementations keep their loaded state behind interior mutability and
/// treat a second `load` as a no-op.
pub trait AssetInstance: Send + Sync + 'static {
    /// Uuid of the definition this instance was created from.
    fn uuid(&self) -> Uuid;

    fn asset_type(&self) -> AssetType;

    /// Absolute path of the backing resource, if there is one.
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Perform the load step (resource I/O, device object creation).
    fn load(&self) -> Result<()>;

    fn is_loaded(&self) -> bool;
}
