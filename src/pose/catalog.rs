use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    pose::Connection,
};

/// Pose name meaning "classify nothing".
pub const NO_POSE: &str = "no_pose";

/// Expected angle between two connections that share one landmark.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct AngleRule {
    #[serde(rename = "connection1")]
    pub connection_a: Connection,
    #[serde(rename = "connection2")]
    pub connection_b: Connection,
    #[serde(rename = "value")]
    pub expected_degrees: f32,
}

impl AngleRule {
    pub fn new(connection_a: Connection, connection_b: Connection, expected_degrees: f32) -> Self {
        Self {
            connection_a,
            connection_b,
            expected_degrees,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PoseDefinition {
    pub name: String,
    #[serde(rename = "angles")]
    pub rules: Vec<AngleRule>,
}

#[derive(Deserialize)]
struct CatalogDocument {
    poses: Vec<PoseDefinition>,
}

/// Read-only table of reference poses keyed by name.
#[derive(Clone, Debug, Default)]
pub struct PoseCatalog {
    poses: HashMap<String, PoseDefinition>,
}

impl PoseCatalog {
    pub fn new(poses: impl IntoIterator<Item = PoseDefinition>) -> Self {
        let mut catalog = Self::default();
        for pose in poses {
            if catalog.poses.contains_key(&pose.name) {
                log::warn!("duplicate pose definition {:?}, keeping the last one", pose.name);
            }
            catalog.poses.insert(pose.name.clone(), pose);
        }
        catalog
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json).map_err(Error::ParseCatalog)?;
        Ok(Self::new(document.poses))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|err| Error::ReadFile(err, path.to_path_buf()))?;
        let catalog = Self::from_json_str(&contents)?;
        log::info!("loaded {} poses from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&PoseDefinition> {
        self.poses.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.poses.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.poses.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}
