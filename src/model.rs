//! Declarative entity model manifest.
//!
//! The manifest is produced by the model codegen and lists each entity with
//! its declared relations; this module only loads it. Deriving facts from it
//! is [`crate::schema::static_model`]'s job.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Model {
    pub entities: Vec<EntityDef>,
}

#[derive(Debug, Deserialize)]
pub struct EntityDef {
    /// Entity type name, e.g. `BlockHeader`.
    pub name: String,
    #[serde(default)]
    pub relations: Vec<RelationDef>,
}

#[derive(Debug, Deserialize)]
pub struct RelationDef {
    /// Property name on the declaring entity.
    pub name: String,
    /// Target entity type name.
    pub target: String,
    pub kind: RelationKind,
    /// Property on the target entity modeling the inverse side, if any.
    #[serde(default)]
    pub inverse: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    ManyToOne,
    OneToOne,
    OneToMany,
}

// ---------- errors ----------

#[derive(Debug)]
pub enum ModelError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, serde_json::Error),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Io(path, e) => {
                write!(f, "cannot read model manifest {}: {e}", path.display())
            }
            ModelError::Parse(path, e) => {
                write!(f, "malformed model manifest {}: {e}", path.display())
            }
        }
    }
}

impl std::error::Error for ModelError {}

// ---------- loader ----------

pub fn load_model(path: &Path) -> Result<Model, ModelError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ModelError::Io(path.to_path_buf(), e))?;
    serde_json::from_str(&raw).map_err(|e| ModelError::Parse(path.to_path_buf(), e))
}
