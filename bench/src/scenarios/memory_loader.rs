use std::sync::atomic::{AtomicBool, Ordering};

use dream_engine::Result;
use dream_engine::asset::{AssetDefinition, AssetInstance, AssetLoader, AssetType};
use uuid::Uuid;

/// Asset instance with no backing data.
#[derive(Debug)]
pub struct MemoryInstance {
    uuid: Uuid,
    asset_type: AssetType,
    loaded: AtomicBool,
}

impl AssetInstance for MemoryInstance {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    fn load(&self) -> Result<()> {
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

/// Loader that never touches the disk, so benchmarks measure the cache and
/// scene rather than file IO.
#[derive(Debug, Clone, Copy)]
pub struct MemoryLoader {
    asset_type: AssetType,
}

impl MemoryLoader {
    pub fn new(asset_type: AssetType) -> Self {
        Self { asset_type }
    }
}

impl AssetLoader for MemoryLoader {
    type Instance = MemoryInstance;

    fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    fn load_instance(&self, definition: &AssetDefinition) -> Result<MemoryInstance> {
        Ok(MemoryInstance {
            uuid: definition.uuid,
            asset_type: definition.asset_type,
            loaded: AtomicBool::new(false),
        })
    }
}
