use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Media category of a validated asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Photo,
    Video,
    Music,
    Logo,
}

/// Descriptor for an asset that already passed validation and preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    pub id: String,
    pub kind: AssetKind,
    pub path: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Playback length; `None` for stills.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl AssetDescriptor {
    pub fn photo(id: &str, path: &str, width: u32, height: u32) -> Self {
        Self {
            id: id.to_string(),
            kind: AssetKind::Photo,
            path: path.to_string(),
            width: Some(width),
            height: Some(height),
            duration_ms: None,
        }
    }

    pub fn video(id: &str, path: &str, duration_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            kind: AssetKind::Video,
            path: path.to_string(),
            width: None,
            height: None,
            duration_ms: Some(duration_ms),
        }
    }
}

/// Supplies validated descriptors by id.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Result<AssetDescriptor, LoadError>;
}

/// In-memory registry of every asset the show may reference.
#[derive(Debug, Default, Clone)]
pub struct AssetStore {
    assets: HashMap<String, AssetDescriptor>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            assets: HashMap::new(),
        }
    }

    /// Reads a JSON array of asset descriptors.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let assets: Vec<AssetDescriptor> = serde_json::from_str(&raw)?;
        Ok(assets.into_iter().collect())
    }

    pub fn register(&mut self, asset: AssetDescriptor) {
        self.assets.insert(asset.id.clone(), asset);
    }

    pub fn remove(&mut self, id: &str) -> Option<AssetDescriptor> {
        self.assets.remove(id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetResolver for AssetStore {
    fn resolve(&self, id: &str) -> Result<AssetDescriptor, LoadError> {
        self.assets
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::AssetMissing(id.to_string()))
    }
}

impl FromIterator<AssetDescriptor> for AssetStore {
    fn from_iter<I: IntoIterator<Item = AssetDescriptor>>(iter: I) -> Self {
        let mut store = Self::new();
        for asset in iter {
            store.register(asset);
        }
        store
    }
}
