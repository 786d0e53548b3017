use std::path::{Path, PathBuf};

use super::ProjectDefinition;
use crate::asset::AssetDefinition;
use crate::error::Result;

/// Name of the project description inside a project directory.
pub const PROJECT_FILE: &str = "project.json";

/// Root directory of a project on disk.
///
/// ```text
/// <base>/project.json
/// <base>/assets/<type>/<uuid>/<format>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirectory {
    base: PathBuf,
}

impl ProjectDirectory {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn project_file(&self) -> PathBuf {
        self.base.join(PROJECT_FILE)
    }

    /// Absolute location of the resource backing `definition`.
    pub fn asset_path(&self, definition: &AssetDefinition) -> PathBuf {
        self.base.join(definition.relative_path())
    }

    pub fn load_project(&self) -> Result<ProjectDefinition> {
        ProjectDefinition::from_path(self.project_file())
    }
}
