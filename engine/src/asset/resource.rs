use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::trace;
use uuid::Uuid;

use super::{AssetDefinition, AssetInstance, AssetLoader, AssetType};
use crate::error::{EngineError, Result};
use crate::project::ProjectDirectory;

/// File-backed instance used for categories without a dedicated loader.
///
/// Creation only checks that the resource exists; `load` reads its metadata
/// and records the size.
#[derive(Debug)]
pub struct ResourceInstance {
    uuid: Uuid,
    asset_type: AssetType,
    path: PathBuf,
    size: AtomicU64,
    loaded: AtomicBool,
}

impl ResourceInstance {
    /// Size in bytes, zero until loaded.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }
}

impl AssetInstance for ResourceInstance {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let metadata = fs::metadata(&self.path).map_err(|e| {
            EngineError::load_failure(self.uuid, format!("{}: {}", self.path.display(), e))
        })?;
        self.size.store(metadata.len(), Ordering::Release);
        self.loaded.store(true, Ordering::Release);
        trace!("Loaded {} ({} bytes)", self.path.display(), metadata.len());
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

/// Resolves definitions to files under the project's `assets/` directory.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    asset_type: AssetType,
    directory: ProjectDirectory,
}

impl ResourceLoader {
    pub fn new(asset_type: AssetType, directory: ProjectDirectory) -> Self {
        Self {
            asset_type,
            directory,
        }
    }
}

impl AssetLoader for ResourceLoader {
    type Instance = ResourceInstance;

    fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    fn load_instance(&self, definition: &AssetDefinition) -> Result<ResourceInstance> {
        let path = self.directory.asset_path(definition);
        if !path.is_file() {
            return Err(EngineError::load_failure(
                definition.uuid,
                format!("resource missing at {}", path.display()),
            ));
        }
        Ok(ResourceInstance {
            uuid: definition.uuid,
            asset_type: definition.asset_type,
            path,
            size: AtomicU64::new(0),
            loaded: AtomicBool::new(false),
        })
    }
}
