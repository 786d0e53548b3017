use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Category of an asset. Each category is served by its own cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetType {
    Animation,
    Audio,
    Font,
    Light,
    Model,
    PhysicsObject,
    Script,
    Shader,
    Sprite,
}

impl AssetType {
    pub const ALL: [AssetType; 9] = [
        AssetType::Animation,
        AssetType::Audio,
        AssetType::Font,
        AssetType::Light,
        AssetType::Model,
        AssetType::PhysicsObject,
        AssetType::Script,
        AssetType::Shader,
        AssetType::Sprite,
    ];

    /// Directory name used under `assets/` in a project.
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Animation => "animation",
            AssetType::Audio => "audio",
            AssetType::Font => "font",
            AssetType::Light => "light",
            AssetType::Model => "model",
            AssetType::PhysicsObject => "physicsObject",
            AssetType::Script => "script",
            AssetType::Shader => "shader",
            AssetType::Sprite => "sprite",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a loadable asset, shared by every instance
/// created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDefinition {
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    /// Source format, e.g. `glsl`, `ttf`, `ogg`. Also the resource file name.
    pub format: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl AssetDefinition {
    pub fn new(
        uuid: Uuid,
        name: impl Into<String>,
        asset_type: AssetType,
        format: impl Into<String>,
    ) -> Self {
        Self {
            uuid,
            name: name.into(),
            asset_type,
            format: format.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Whether `format` names a single file inside the asset's directory.
    pub fn has_plain_format(&self) -> bool {
        !matches!(self.format.as_str(), "" | "." | "..") && !self.format.contains(['/', '\\'])
    }

    /// Location of the resource relative to the project directory:
    /// `assets/<type>/<uuid>/<format>`.
    pub fn relative_path(&self) -> PathBuf {
        let uuid = self.uuid.to_string();
        [
            "assets",
            self.asset_type.as_str(),
            uuid.as_str(),
            self.format.as_str(),
        ]
        .iter()
        .collect()
    }
}

/// The project's table of asset definitions, keyed by uuid.
///
/// This is what caches consult when an instance is requested by uuid alone.
#[derive(Debug, Default)]
pub struct AssetDefinitions {
    by_uuid: HashMap<Uuid, Arc<AssetDefinition>>,
}

impl AssetDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table, rejecting duplicate uuids.
    pub fn from_definitions<I>(definitions: I) -> Result<Self>
    where
        I: IntoIterator<Item = AssetDefinition>,
    {
        let mut table = Self::new();
        for definition in definitions {
            table.insert(definition)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, definition: AssetDefinition) -> Result<Arc<AssetDefinition>> {
        if self.by_uuid.contains_key(&definition.uuid) {
            return Err(EngineError::InvalidProject(format!(
                "duplicate asset definition {}",
                definition.uuid
            )));
        }
        let definition = Arc::new(definition);
        self.by_uuid.insert(definition.uuid, Arc::clone(&definition));
        Ok(definition)
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&Arc<AssetDefinition>> {
        self.by_uuid.get(uuid)
    }

    /// Like [`get`](Self::get) but reports a missing uuid as an error.
    pub fn resolve(&self, uuid: &Uuid) -> Result<&Arc<AssetDefinition>> {
        self.by_uuid
            .get(uuid)
            .ok_or(EngineError::MissingDefinition(*uuid))
    }

    pub fn of_type(&self, asset_type: AssetType) -> impl Iterator<Item = &Arc<AssetDefinition>> {
        self.by_uuid
            .values()
            .filter(move |definition| definition.asset_type == asset_type)
    }

    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty()
    }
}
