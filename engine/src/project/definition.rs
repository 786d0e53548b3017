use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::{AssetDefinition, AssetType};
use crate::error::{EngineError, Result};

/// A node in a scene description. Children are nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub uuid: Uuid,
    pub name: String,
    /// Asset used for each category, by definition uuid.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<AssetType, Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDefinition>,
    /// Remove the node this long after it joins the scene.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub die_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl NodeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            assets: BTreeMap::new(),
            children: Vec::new(),
            die_after_ms: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_asset(mut self, asset_type: AssetType, uuid: Uuid) -> Self {
        self.assets.insert(asset_type, uuid);
        self
    }

    pub fn with_child(mut self, child: NodeDefinition) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_die_after_ms(mut self, millis: u64) -> Self {
        self.die_after_ms = Some(millis);
        self
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a NodeDefinition) -> Result<()>) -> Result<()> {
        f(self)?;
        for child in &self.children {
            child.visit(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDefinition {
    pub uuid: Uuid,
    pub name: String,
    pub root: NodeDefinition,
}

/// A complete project: its assets and scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDefinition {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub startup_scene: Uuid,
    #[serde(default)]
    pub assets: Vec<AssetDefinition>,
    #[serde(default)]
    pub scenes: Vec<SceneDefinition>,
}

impl ProjectDefinition {
    /// Parses and validates a project description.
    pub fn from_json(json: &str) -> Result<Self> {
        let project: Self = serde_json::from_str(json)?;
        project.validate()?;
        Ok(project)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn scene(&self, uuid: Uuid) -> Result<&SceneDefinition> {
        self.scenes
            .iter()
            .find(|scene| scene.uuid == uuid)
            .ok_or(EngineError::UnknownScene(uuid))
    }

    pub fn startup(&self) -> Result<&SceneDefinition> {
        self.scene(self.startup_scene)
    }

    pub fn asset(&self, uuid: Uuid) -> Option<&AssetDefinition> {
        self.assets.iter().find(|asset| asset.uuid == uuid)
    }

    /// Checks uuid uniqueness, that asset formats stay inside their asset
    /// directory, that the startup scene exists and that every node's asset
    /// references point at definitions of the right category.
    pub fn validate(&self) -> Result<()> {
        let mut asset_uuids = HashSet::new();
        for asset in &self.assets {
            if !asset_uuids.insert(asset.uuid) {
                return Err(invalid(format!("duplicate asset {}", asset.uuid)));
            }
            if !asset.has_plain_format() {
                return Err(invalid(format!(
                    "asset {} has format {:?}, expected a file name",
                    asset.uuid, asset.format
                )));
            }
        }

        let mut scene_uuids = HashSet::new();
        for scene in &self.scenes {
            if !scene_uuids.insert(scene.uuid) {
                return Err(invalid(format!("duplicate scene {}", scene.uuid)));
            }

            let mut node_uuids = HashSet::new();
            scene.root.visit(&mut |node| {
                if !node_uuids.insert(node.uuid) {
                    return Err(invalid(format!(
                        "duplicate node {} in scene {}",
                        node.uuid, scene.name
                    )));
                }
                for (asset_type, uuid) in &node.assets {
                    match self.asset(*uuid) {
                        None => {
                            return Err(invalid(format!(
                                "node {} references unknown asset {}",
                                node.name, uuid
                            )));
                        }
                        Some(asset) if asset.asset_type != *asset_type => {
                            return Err(invalid(format!(
                                "node {} lists {} asset {} as {}",
                                node.name, asset.asset_type, uuid, asset_type
                            )));
                        }
                        Some(_) => {}
                    }
                }
                Ok(())
            })?;
        }

        if !scene_uuids.contains(&self.startup_scene) {
            return Err(EngineError::UnknownScene(self.startup_scene));
        }
        Ok(())
    }
}

fn invalid(message: String) -> EngineError {
    EngineError::InvalidProject(message)
}
